use std::sync::{Arc, Mutex};

use rusqlite::{Connection, InterruptHandle, Statement};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use super::{BoundParam, DriverError, Row, RowStream};
use crate::value::SqlValue;

/// SQLite session. The connection string is a file path (or `:memory:`).
///
/// rusqlite is blocking, so every statement runs on the blocking pool.
pub struct SqliteSession {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSession {
    pub async fn open(path: &str) -> Result<Self, DriverError> {
        let path = path.to_string();
        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            // Source and target may be the same file. In WAL mode the reader's
            // open statement does not block target commits; in-memory
            // databases stay on "memory".
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!(journal_mode = %mode, "sqlite session opened");
            Ok::<_, DriverError>(conn)
        })
        .await
        .map_err(|e| DriverError::Worker(e.to_string()))??;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Stream the rows of `sql` through a bounded channel fed by a blocking
    /// reader task.
    ///
    /// The reader stops as soon as the receiving side is dropped, and the
    /// stream's guard interrupts a statement that is still stepping.
    pub async fn fetch(self, sql: &str, buffer: usize) -> Result<RowStream, DriverError> {
        let conn = match Arc::try_unwrap(self.conn) {
            Ok(m) => m.into_inner().unwrap_or_else(|p| p.into_inner()),
            Err(_) => return Err(DriverError::Worker("sqlite session is shared".into())),
        };
        let interrupt = InterruptGuard(conn.get_interrupt_handle());
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let sql = sql.to_string();

        tokio::task::spawn_blocking(move || {
            if let Err(e) = read_rows(&conn, &sql, &tx) {
                // The receiver may already be gone; nothing left to tell then.
                let _ = tx.blocking_send(Err(e));
            }
            debug!("sqlite reader finished");
        });

        Ok(RowStream::new(ReceiverStream::new(rx), interrupt))
    }

    pub async fn execute(&mut self, sql: &str, params: &[BoundParam]) -> Result<u64, DriverError> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let params = params.to_vec();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|p| p.into_inner());
            let mut stmt = conn.prepare_cached(&sql)?;
            bind_params(&mut stmt, &params)?;
            let n = stmt.raw_execute()?;
            Ok::<_, DriverError>(n as u64)
        })
        .await
        .map_err(|e| DriverError::Worker(e.to_string()))?
    }
}

/// Interrupts whatever the reader connection is doing when the stream is dropped.
struct InterruptGuard(InterruptHandle);

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.0.interrupt();
    }
}

fn read_rows(
    conn: &Connection,
    sql: &str,
    tx: &mpsc::Sender<Result<Row, DriverError>>,
) -> Result<(), DriverError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Arc<[String]> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let values = (0..width)
            .map(|i| row.get::<_, SqlValue>(i))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if tx.blocking_send(Ok(Row::new(Arc::clone(&columns), values))).is_err() {
            // Consumer stopped early (failure or cancellation).
            break;
        }
    }
    Ok(())
}

/// Bind by name when the statement declares the parameter, otherwise by
/// position (mapping order) into anonymous `?` slots.
fn bind_params(stmt: &mut Statement<'_>, params: &[BoundParam]) -> Result<(), DriverError> {
    for (position, param) in params.iter().enumerate() {
        let index = match named_index(stmt, &param.name)? {
            Some(idx) => idx,
            None => {
                let idx = position + 1;
                if idx > stmt.parameter_count() || stmt.parameter_name(idx).is_some() {
                    return Err(DriverError::Binding(format!(
                        "target query has no parameter named {}",
                        param.name
                    )));
                }
                idx
            }
        };
        stmt.raw_bind_parameter(index, &param.value)?;
    }
    Ok(())
}

/// SQLite keeps the prefix as part of the name; accept mappings written
/// with or without one.
fn named_index(stmt: &Statement<'_>, name: &str) -> Result<Option<usize>, DriverError> {
    if name.starts_with(['@', ':', '$']) {
        return Ok(stmt.parameter_index(name)?);
    }
    for prefix in ['@', ':', '$'] {
        if let Some(idx) = stmt.parameter_index(&format!("{prefix}{name}"))? {
            return Ok(Some(idx));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, value: SqlValue) -> BoundParam {
        BoundParam {
            name: name.to_string(),
            value,
        }
    }

    #[test]
    fn binds_named_parameters_regardless_of_order() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a, b)").unwrap();
        let mut stmt = conn.prepare("INSERT INTO t (a, b) VALUES (@a, :b)").unwrap();
        bind_params(
            &mut stmt,
            &[param("b", SqlValue::Integer(2)), param("@a", SqlValue::Integer(1))],
        )
        .unwrap();
        stmt.raw_execute().unwrap();
        let (a, b): (i64, i64) = conn
            .query_row("SELECT a, b FROM t", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!((a, b), (1, 2));
    }

    #[test]
    fn falls_back_to_positional_for_anonymous_slots() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a, b)").unwrap();
        let mut stmt = conn.prepare("INSERT INTO t (a, b) VALUES (?, ?)").unwrap();
        bind_params(
            &mut stmt,
            &[param("@x", SqlValue::Text("first".into())), param("@y", SqlValue::Null)],
        )
        .unwrap();
        stmt.raw_execute().unwrap();
        let a: String = conn.query_row("SELECT a FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(a, "first");
    }

    #[test]
    fn unknown_named_parameter_is_a_binding_error() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a)").unwrap();
        let mut stmt = conn.prepare("INSERT INTO t (a) VALUES (@a)").unwrap();
        let err = bind_params(&mut stmt, &[param("@zzz", SqlValue::Null)]).unwrap_err();
        assert!(matches!(err, DriverError::Binding(_)));
    }
}
