use relay_core::types::{ErrorKind, IntegrationLog};
use tracing::{debug, instrument, warn};

use crate::db::{lock, SharedDb};
use crate::error::{Result, StoreError};
use crate::store::RunLogStore;

const SELECT_COLUMNS: &str = "SELECT id, integration_id, run_at, success, message, row_count,
                                     duration_ms, error_kind, error_detail
                              FROM integration_logs";

/// Append-only run log.
pub struct RunLogRepo {
    db: SharedDb,
}

impl RunLogRepo {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }
}

impl RunLogStore for RunLogRepo {
    #[instrument(skip(self, log), fields(log_id = %log.id, integration_id = %log.integration_id))]
    fn append(&self, log: &IntegrationLog) -> Result<()> {
        let db = lock(&self.db);
        db.execute(
            "INSERT INTO integration_logs
             (id, integration_id, run_at, success, message, row_count, duration_ms,
              error_kind, error_detail)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                log.id,
                log.integration_id,
                log.run_at,
                log.success,
                log.message,
                log.row_count as i64,
                log.duration_ms as i64,
                log.error_kind.map(|k| k.code()),
                log.error_detail,
            ],
        )?;
        debug!(success = log.success, rows = log.row_count, "run log appended");
        Ok(())
    }

    fn get_recent(&self, limit: usize) -> Result<Vec<IntegrationLog>> {
        let db = lock(&self.db);
        let mut stmt = db.prepare(&format!("{SELECT_COLUMNS} ORDER BY run_at DESC, id DESC LIMIT ?1"))?;
        let rows = stmt.query_map([limit as i64], row_to_log)?;
        rows.map(|r| IntegrationLog::try_from(r?)).collect()
    }

    fn get_by_integration_id(&self, integration_id: &str) -> Result<Vec<IntegrationLog>> {
        let db = lock(&self.db);
        let mut stmt = db.prepare(&format!(
            "{SELECT_COLUMNS} WHERE integration_id = ?1 ORDER BY run_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([integration_id], row_to_log)?;
        rows.map(|r| IntegrationLog::try_from(r?)).collect()
    }
}

pub(crate) struct LogRow {
    id: String,
    integration_id: String,
    run_at: String,
    success: bool,
    message: Option<String>,
    row_count: i64,
    duration_ms: i64,
    error_kind: Option<String>,
    error_detail: Option<String>,
}

impl TryFrom<LogRow> for IntegrationLog {
    type Error = StoreError;

    fn try_from(row: LogRow) -> Result<Self> {
        // An unknown code (written by a newer build) degrades to Internal
        // rather than hiding the whole row from reports.
        let error_kind = row.error_kind.map(|code| {
            code.parse::<ErrorKind>().unwrap_or_else(|e| {
                warn!(log_id = %row.id, "{e}");
                ErrorKind::Internal
            })
        });
        Ok(IntegrationLog {
            id: row.id,
            integration_id: row.integration_id,
            run_at: row.run_at,
            success: row.success,
            message: row.message,
            row_count: u64::try_from(row.row_count)
                .map_err(|_| StoreError::InvalidRow(format!("negative row_count {}", row.row_count)))?,
            duration_ms: row.duration_ms.max(0) as u64,
            error_kind,
            error_detail: row.error_detail,
        })
    }
}

fn row_to_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogRow> {
    Ok(LogRow {
        id: row.get(0)?,
        integration_id: row.get(1)?,
        run_at: row.get(2)?,
        success: row.get(3)?,
        message: row.get(4)?,
        row_count: row.get(5)?,
        duration_ms: row.get(6)?,
        error_kind: row.get(7)?,
        error_detail: row.get(8)?,
    })
}
