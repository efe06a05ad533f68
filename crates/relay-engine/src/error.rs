use relay_core::types::{DatabaseKind, ErrorKind};
use relay_store::StoreError;
use thiserror::Error;

use crate::driver::DriverError;
use crate::secrets::SecretError;

/// Why a run failed. Never escapes the engine: it is folded into a failed
/// `RunOutcome` and its log row.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{side} connection '{name}' ({id}) is inactive")]
    InactiveConnection {
        side: &'static str,
        id: String,
        name: String,
    },

    #[error("could not open {side} connection: {reason}")]
    ConnectionFailed { side: &'static str, reason: String },

    #[error("{side} connection uses {kind}, which has no driver")]
    UnsupportedDatabase {
        side: &'static str,
        kind: DatabaseKind,
    },

    #[error("source query failed: {0}")]
    SourceQuery(DriverError),

    #[error("target query failed on row {row}: {source}")]
    TargetQuery { row: u64, source: DriverError },

    #[error("mapped column '{column}' is not in the source result")]
    Mapping {
        column: String,
        available: Vec<String>,
    },

    #[error("run cancelled after {rows} rows")]
    Cancelled { rows: u64 },

    #[error("integration {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("run panicked: {0}")]
    Panicked(String),
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::InactiveConnection { .. } => ErrorKind::InactiveConnection,
            RunError::ConnectionFailed { .. } | RunError::Secret(_) => ErrorKind::ConnectionFailed,
            RunError::UnsupportedDatabase { .. } => ErrorKind::UnsupportedDatabase,
            RunError::SourceQuery(_) => ErrorKind::SourceQueryError,
            RunError::TargetQuery { .. } => ErrorKind::TargetQueryError,
            RunError::Mapping { .. } => ErrorKind::MappingError,
            RunError::Cancelled { .. } => ErrorKind::Cancelled,
            RunError::NotFound(_) => ErrorKind::NotFound,
            RunError::Store(_) | RunError::Panicked(_) => ErrorKind::Internal,
        }
    }

    /// Diagnostic text for the log's `error_detail` column.
    pub fn detail(&self) -> String {
        match self {
            RunError::Mapping { column, available } => format!(
                "{}: mapping references '{column}'; source columns are [{}]",
                self.kind(),
                available.join(", ")
            ),
            RunError::TargetQuery { row, source } => {
                format!("{}: row {row}: {source:?}", self.kind())
            }
            RunError::SourceQuery(source) => format!("{}: {source:?}", self.kind()),
            other => format!("{}: {other}", other.kind()),
        }
    }

    /// Classify a failure to open a session.
    pub(crate) fn from_open(side: &'static str, err: DriverError) -> Self {
        match err {
            DriverError::Unsupported(kind) => RunError::UnsupportedDatabase { side, kind },
            other => RunError::ConnectionFailed {
                side,
                reason: other.to_string(),
            },
        }
    }
}
