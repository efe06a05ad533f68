use relay_core::types::{new_id, now_rfc3339, ScheduledJob};
use tracing::{info, instrument};

use crate::db::{lock, SharedDb};
use crate::error::{Result, StoreError};
use crate::store::ScheduledJobStore;

const SELECT_COLUMNS: &str = "SELECT id, integration_id, cron_expression, trigger_handle,
                                     suspended, created_at, updated_at
                              FROM scheduled_jobs";

/// Persisted schedule intent. The scheduler reconciles its live triggers
/// against these rows at startup.
pub struct ScheduledJobRepo {
    db: SharedDb,
}

impl ScheduledJobRepo {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }

    /// Every job, suspended ones included, oldest first.
    pub fn list(&self) -> Result<Vec<ScheduledJob>> {
        let db = lock(&self.db);
        let mut stmt = db.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at"))?;
        let rows = stmt.query_map([], row_to_job)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

impl ScheduledJobStore for ScheduledJobRepo {
    fn get_by_id(&self, id: &str) -> Result<Option<ScheduledJob>> {
        let db = lock(&self.db);
        match db.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), [id], row_to_job) {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    fn get_all_active(&self) -> Result<Vec<ScheduledJob>> {
        let db = lock(&self.db);
        let mut stmt = db.prepare(&format!(
            "{SELECT_COLUMNS} WHERE suspended = 0 ORDER BY created_at"
        ))?;
        let rows = stmt.query_map([], row_to_job)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    fn get_by_integration_id(&self, integration_id: &str) -> Result<Vec<ScheduledJob>> {
        let db = lock(&self.db);
        let mut stmt = db.prepare(&format!(
            "{SELECT_COLUMNS} WHERE integration_id = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt.query_map([integration_id], row_to_job)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    #[instrument(skip(self))]
    fn create(&self, integration_id: &str, cron_expression: &str) -> Result<ScheduledJob> {
        let now = now_rfc3339();
        let job = ScheduledJob {
            id: new_id(),
            integration_id: integration_id.to_string(),
            cron_expression: cron_expression.to_string(),
            trigger_handle: None,
            suspended: false,
            created_at: now.clone(),
            updated_at: now,
        };
        let db = lock(&self.db);
        db.execute(
            "INSERT INTO scheduled_jobs
             (id, integration_id, cron_expression, trigger_handle, suspended, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, 0, ?4, ?4)",
            rusqlite::params![job.id, job.integration_id, job.cron_expression, job.created_at],
        )?;
        info!(job_id = %job.id, "scheduled job created");
        Ok(job)
    }

    fn set_trigger_handle(&self, id: &str, handle: Option<&str>) -> Result<()> {
        let db = lock(&self.db);
        let n = db.execute(
            "UPDATE scheduled_jobs SET trigger_handle = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![handle, now_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "scheduled job",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn set_cron_expression(&self, id: &str, cron_expression: &str) -> Result<()> {
        let db = lock(&self.db);
        let n = db.execute(
            "UPDATE scheduled_jobs SET cron_expression = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![cron_expression, now_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "scheduled job",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn set_suspended(&self, id: &str, suspended: bool) -> Result<()> {
        let db = lock(&self.db);
        let n = db.execute(
            "UPDATE scheduled_jobs SET suspended = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![suspended, now_rfc3339(), id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "scheduled job",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete(&self, id: &str) -> Result<bool> {
        let db = lock(&self.db);
        let n = db.execute("DELETE FROM scheduled_jobs WHERE id = ?1", [id])?;
        if n > 0 {
            info!(job_id = %id, "scheduled job deleted");
        }
        Ok(n > 0)
    }
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduledJob> {
    Ok(ScheduledJob {
        id: row.get(0)?,
        integration_id: row.get(1)?,
        cron_expression: row.get(2)?,
        trigger_handle: row.get(3)?,
        suspended: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
