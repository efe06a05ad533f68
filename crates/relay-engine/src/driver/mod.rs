//! Database drivers behind a closed set of session variants.
//!
//! The engine never branches on [`DatabaseKind`] itself: it opens a
//! [`DbSession`], fetches a [`RowStream`] from the source one and calls
//! [`DbSession::execute`] on the target one. Supporting another database is a
//! new variant here.

mod postgres;
mod sqlite;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use relay_core::types::DatabaseKind;
use thiserror::Error;

use crate::value::SqlValue;

pub use self::postgres::{rewrite_named_placeholders, PostgresSession};
pub use self::sqlite::SqliteSession;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("postgres: {0}")]
    Postgres(String),

    #[error("no driver for {0} connections")]
    Unsupported(DatabaseKind),

    /// A value or parameter could not be bound to the target statement.
    #[error("binding: {0}")]
    Binding(String),

    /// The background worker serving this session went away.
    #[error("driver worker stopped: {0}")]
    Worker(String),
}

impl From<tokio_postgres::Error> for DriverError {
    fn from(e: tokio_postgres::Error) -> Self {
        // The plain Display of a server error is just "db error"; the
        // interesting part lives on the DbError.
        let msg = match e.as_db_error() {
            Some(db) => format!("{} ({})", db.message(), db.code().code()),
            None => e.to_string(),
        };
        DriverError::Postgres(msg)
    }
}

/// One source row: shared column names plus this row's values.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A value bound to a named target parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    /// Parameter name as written in the mapping (e.g. `@p1`).
    pub name: String,
    pub value: SqlValue,
}

/// Finite, single-use stream of source rows.
///
/// Not restartable: reading the rows again means running the query again.
/// Dropping the stream early stops the producer and releases the source
/// connection.
pub struct RowStream {
    inner: Pin<Box<dyn Stream<Item = Result<Row, DriverError>> + Send>>,
    // Keeps the producing session alive for as long as rows are read, and
    // lets it clean up on drop.
    _guard: Box<dyn Send>,
}

impl RowStream {
    pub(crate) fn new(
        inner: impl Stream<Item = Result<Row, DriverError>> + Send + 'static,
        guard: impl Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(inner),
            _guard: Box::new(guard),
        }
    }
}

impl Stream for RowStream {
    type Item = Result<Row, DriverError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// An open connection to one source or target database.
pub enum DbSession {
    Sqlite(SqliteSession),
    Postgres(PostgresSession),
}

impl DbSession {
    /// Open a session for `kind`. The connection string is only handed to the
    /// driver and never kept in error messages.
    pub async fn open(kind: DatabaseKind, connection_string: &str) -> Result<Self, DriverError> {
        match kind {
            DatabaseKind::Sqlite => Ok(DbSession::Sqlite(SqliteSession::open(connection_string).await?)),
            DatabaseKind::PostgreSql => {
                Ok(DbSession::Postgres(PostgresSession::open(connection_string).await?))
            }
            DatabaseKind::SqlServer | DatabaseKind::MySql | DatabaseKind::Oracle => {
                Err(DriverError::Unsupported(kind))
            }
        }
    }

    pub fn kind(&self) -> DatabaseKind {
        match self {
            DbSession::Sqlite(_) => DatabaseKind::Sqlite,
            DbSession::Postgres(_) => DatabaseKind::PostgreSql,
        }
    }

    /// Run `sql` and stream its rows. Consumes the session; the stream owns
    /// the connection from here on.
    pub async fn fetch(self, sql: &str, buffer: usize) -> Result<RowStream, DriverError> {
        match self {
            DbSession::Sqlite(s) => s.fetch(sql, buffer).await,
            DbSession::Postgres(s) => s.fetch(sql).await,
        }
    }

    /// Execute `sql` once with `params`, returning the affected row count.
    pub async fn execute(&mut self, sql: &str, params: &[BoundParam]) -> Result<u64, DriverError> {
        match self {
            DbSession::Sqlite(s) => s.execute(sql, params).await,
            DbSession::Postgres(s) => s.execute(sql, params).await,
        }
    }
}
