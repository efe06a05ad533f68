use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::Result;

/// One SQLite connection shared by every repository in the process.
///
/// Repositories serialise on the mutex; the catalog is small and writes are
/// rare compared to the transfer work, so a pool is not worth it here.
pub type SharedDb = Arc<Mutex<Connection>>;

/// Open (creating if needed) the catalog database at `path` and run the schema.
pub fn open(path: impl AsRef<Path>) -> Result<SharedDb> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    init_db(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Open a private in-memory catalog. Used by tests and one-shot CLI runs.
pub fn open_in_memory() -> Result<SharedDb> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    init_db(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Lock the shared connection, recovering the guard if a previous holder panicked.
///
/// A panic mid-statement leaves SQLite itself consistent (the statement is
/// rolled back), so the poisoned flag carries no information worth failing on.
pub(crate) fn lock(db: &SharedDb) -> MutexGuard<'_, Connection> {
    db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Initialise every catalog table. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_connections_table(conn)?;
    create_integrations_table(conn)?;
    create_mappings_table(conn)?;
    create_scheduled_jobs_table(conn)?;
    create_integration_logs_table(conn)?;
    Ok(())
}

fn create_connections_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS connections (
            id                TEXT PRIMARY KEY,
            name              TEXT NOT NULL UNIQUE,
            connection_string TEXT NOT NULL,
            kind              TEXT NOT NULL,
            is_active         INTEGER NOT NULL DEFAULT 1,
            created_at        TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn create_integrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS integrations (
            id                   TEXT PRIMARY KEY,
            name                 TEXT NOT NULL,
            source_connection_id TEXT NOT NULL REFERENCES connections(id),
            target_connection_id TEXT NOT NULL REFERENCES connections(id),
            source_query         TEXT NOT NULL,
            target_query         TEXT NOT NULL,
            group_name           TEXT,
            execution_order      INTEGER NOT NULL DEFAULT 0,
            created_at           TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_integrations_group
            ON integrations(group_name, execution_order);",
    )?;
    Ok(())
}

/// Mappings are owned by their integration; target parameters are unique per
/// integration and `position` keeps insertion order for positional binding.
fn create_mappings_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS mappings (
            id               TEXT PRIMARY KEY,
            integration_id   TEXT NOT NULL REFERENCES integrations(id) ON DELETE CASCADE,
            source_column    TEXT NOT NULL,
            target_parameter TEXT NOT NULL,
            position         INTEGER NOT NULL,
            UNIQUE(integration_id, target_parameter)
        );
        CREATE INDEX IF NOT EXISTS idx_mappings_integration
            ON mappings(integration_id, position);",
    )?;
    Ok(())
}

/// No foreign key on integration_id: the scheduler removes schedules itself
/// before an integration is deleted.
fn create_scheduled_jobs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS scheduled_jobs (
            id              TEXT PRIMARY KEY,
            integration_id  TEXT NOT NULL,
            cron_expression TEXT NOT NULL,
            trigger_handle  TEXT,
            suspended       INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_integration
            ON scheduled_jobs(integration_id);",
    )?;
    Ok(())
}

/// Append-only. Logs outlive the integration they describe, hence no FK.
fn create_integration_logs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS integration_logs (
            id             TEXT PRIMARY KEY,
            integration_id TEXT NOT NULL,
            run_at         TEXT NOT NULL,
            success        INTEGER NOT NULL,
            message        TEXT,
            row_count      INTEGER NOT NULL DEFAULT 0,
            duration_ms    INTEGER NOT NULL DEFAULT 0,
            error_kind     TEXT,
            error_detail   TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_logs_integration
            ON integration_logs(integration_id, run_at DESC);
        CREATE INDEX IF NOT EXISTS idx_logs_run_at
            ON integration_logs(run_at DESC);",
    )?;
    Ok(())
}
