use relay_core::types::{new_id, now_rfc3339, Connection, DatabaseKind};
use tracing::{info, instrument};

use crate::db::{lock, SharedDb};
use crate::error::{Result, StoreError};
use crate::store::ConnectionStore;

const SELECT_COLUMNS: &str = "SELECT id, name, connection_string, kind, is_active, created_at
                              FROM connections";

/// SQLite-backed connection catalog.
///
/// Connection strings are stored as handed in; encryption at rest belongs to
/// the caller's secrets layer.
pub struct ConnectionRepo {
    db: SharedDb,
}

impl ConnectionRepo {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }

    #[instrument(skip(self, connection_string))]
    pub fn create(
        &self,
        name: &str,
        kind: DatabaseKind,
        connection_string: &str,
    ) -> Result<Connection> {
        let conn = Connection {
            id: new_id(),
            name: name.to_string(),
            connection_string: connection_string.to_string(),
            kind,
            is_active: true,
            created_at: now_rfc3339(),
        };
        let db = lock(&self.db);
        db.execute(
            "INSERT INTO connections (id, name, connection_string, kind, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            rusqlite::params![
                conn.id,
                conn.name,
                conn.connection_string,
                conn.kind.to_string(),
                conn.created_at
            ],
        )?;
        info!(connection_id = %conn.id, %name, %kind, "connection created");
        Ok(conn)
    }

    pub fn list(&self) -> Result<Vec<Connection>> {
        let db = lock(&self.db);
        let mut stmt = db.prepare(&format!("{SELECT_COLUMNS} ORDER BY name"))?;
        let rows = stmt.query_map([], row_to_connection)?;
        rows.map(|r| Connection::try_from(r?)).collect()
    }

    /// Activate or deactivate a connection. Integrations using an inactive
    /// connection fail fast at execution time.
    #[instrument(skip(self))]
    pub fn set_active(&self, id: &str, active: bool) -> Result<()> {
        let db = lock(&self.db);
        let n = db.execute(
            "UPDATE connections SET is_active = ?1 WHERE id = ?2",
            rusqlite::params![active, id],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "connection",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Delete a connection. Refused while any integration references it.
    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<()> {
        let db = lock(&self.db);
        let users: i64 = db.query_row(
            "SELECT COUNT(*) FROM integrations
             WHERE source_connection_id = ?1 OR target_connection_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        if users > 0 {
            return Err(StoreError::ConnectionInUse {
                id: id.to_string(),
                integrations: users as usize,
            });
        }
        let n = db.execute("DELETE FROM connections WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "connection",
                id: id.to_string(),
            });
        }
        info!(connection_id = %id, "connection deleted");
        Ok(())
    }
}

impl ConnectionStore for ConnectionRepo {
    fn get_by_id(&self, id: &str) -> Result<Option<Connection>> {
        let db = lock(&self.db);
        get_connection(&db, id)
    }

    fn get_active(&self) -> Result<Vec<Connection>> {
        let db = lock(&self.db);
        let mut stmt = db.prepare(&format!("{SELECT_COLUMNS} WHERE is_active = 1 ORDER BY name"))?;
        let rows = stmt.query_map([], row_to_connection)?;
        rows.map(|r| Connection::try_from(r?)).collect()
    }
}

/// Row shape before the `kind` column is parsed.
pub(crate) struct ConnectionRow {
    id: String,
    name: String,
    connection_string: String,
    kind: String,
    is_active: bool,
    created_at: String,
}

impl TryFrom<ConnectionRow> for Connection {
    type Error = StoreError;

    fn try_from(row: ConnectionRow) -> Result<Self> {
        let kind = row.kind.parse::<DatabaseKind>().map_err(StoreError::InvalidRow)?;
        Ok(Connection {
            id: row.id,
            name: row.name,
            connection_string: row.connection_string,
            kind,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

fn row_to_connection(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConnectionRow> {
    Ok(ConnectionRow {
        id: row.get(0)?,
        name: row.get(1)?,
        connection_string: row.get(2)?,
        kind: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Shared with the integration repo, which resolves both ends of a transfer
/// under the same lock.
pub(crate) fn get_connection(db: &rusqlite::Connection, id: &str) -> Result<Option<Connection>> {
    match db.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), [id], row_to_connection) {
        Ok(row) => Ok(Some(row.try_into()?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StoreError::Database(e)),
    }
}
