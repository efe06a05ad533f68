use std::collections::HashSet;

use relay_core::types::{
    new_id, now_rfc3339, Integration, Mapping, MappingSpec, NewIntegration, ResolvedIntegration,
};
use tracing::{debug, info, instrument};

use crate::connections::get_connection;
use crate::db::{lock, SharedDb};
use crate::error::{Result, StoreError};
use crate::store::IntegrationStore;

const SELECT_COLUMNS: &str = "SELECT id, name, source_connection_id, target_connection_id,
                                     source_query, target_query, group_name, execution_order,
                                     created_at
                              FROM integrations";

/// SQLite-backed integration definitions together with their mapping sets.
pub struct IntegrationRepo {
    db: SharedDb,
}

impl IntegrationRepo {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }

    /// Insert an integration and its mappings in one transaction.
    ///
    /// Connections are not checked for being active here; that is decided at
    /// execution time because they can be deactivated later anyway.
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub fn create(&self, new: NewIntegration) -> Result<Integration> {
        check_unique_parameters(&new.mappings)?;

        let integration = Integration {
            id: new_id(),
            name: new.name,
            source_connection_id: new.source_connection_id,
            target_connection_id: new.target_connection_id,
            source_query: new.source_query,
            target_query: new.target_query,
            group_name: new.group_name,
            execution_order: new.execution_order,
            created_at: now_rfc3339(),
        };

        let mut db = lock(&self.db);
        let tx = db.transaction()?;
        for (label, conn_id) in [
            ("source", &integration.source_connection_id),
            ("target", &integration.target_connection_id),
        ] {
            if get_connection(&tx, conn_id)?.is_none() {
                debug!(side = label, connection_id = %conn_id, "unknown connection");
                return Err(StoreError::NotFound {
                    entity: "connection",
                    id: conn_id.clone(),
                });
            }
        }
        tx.execute(
            "INSERT INTO integrations
             (id, name, source_connection_id, target_connection_id, source_query,
              target_query, group_name, execution_order, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                integration.id,
                integration.name,
                integration.source_connection_id,
                integration.target_connection_id,
                integration.source_query,
                integration.target_query,
                integration.group_name,
                integration.execution_order,
                integration.created_at,
            ],
        )?;
        insert_mappings(&tx, &integration.id, &new.mappings)?;
        tx.commit()?;

        info!(integration_id = %integration.id, mappings = new.mappings.len(), "integration created");
        Ok(integration)
    }

    pub fn list(&self) -> Result<Vec<Integration>> {
        let db = lock(&self.db);
        let mut stmt = db.prepare(&format!("{SELECT_COLUMNS} ORDER BY name"))?;
        let rows = stmt.query_map([], row_to_integration)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Replace the whole mapping set, preserving the new list's order.
    #[instrument(skip(self, mappings))]
    pub fn replace_mappings(&self, integration_id: &str, mappings: &[MappingSpec]) -> Result<()> {
        check_unique_parameters(mappings)?;
        let mut db = lock(&self.db);
        let tx = db.transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM integrations WHERE id = ?1)",
            [integration_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::NotFound {
                entity: "integration",
                id: integration_id.to_string(),
            });
        }
        tx.execute("DELETE FROM mappings WHERE integration_id = ?1", [integration_id])?;
        insert_mappings(&tx, integration_id, mappings)?;
        tx.commit()?;
        Ok(())
    }
}

impl IntegrationStore for IntegrationRepo {
    fn get_by_id(&self, id: &str) -> Result<Option<ResolvedIntegration>> {
        let db = lock(&self.db);
        let integration = match db.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            [id],
            row_to_integration,
        ) {
            Ok(i) => i,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(StoreError::Database(e)),
        };

        let source = get_connection(&db, &integration.source_connection_id)?.ok_or_else(|| {
            StoreError::NotFound {
                entity: "connection",
                id: integration.source_connection_id.clone(),
            }
        })?;
        let target = get_connection(&db, &integration.target_connection_id)?.ok_or_else(|| {
            StoreError::NotFound {
                entity: "connection",
                id: integration.target_connection_id.clone(),
            }
        })?;

        let mut stmt = db.prepare(
            "SELECT id, integration_id, source_column, target_parameter, position
             FROM mappings WHERE integration_id = ?1 ORDER BY position",
        )?;
        let mappings = stmt
            .query_map([id], |row| {
                Ok(Mapping {
                    id: row.get(0)?,
                    integration_id: row.get(1)?,
                    source_column: row.get(2)?,
                    target_parameter: row.get(3)?,
                    position: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(ResolvedIntegration {
            integration,
            source,
            target,
            mappings,
        }))
    }

    fn get_all_grouped_ordered(&self) -> Result<Vec<Integration>> {
        let db = lock(&self.db);
        // Ungrouped integrations (NULL group) sort first in SQLite.
        let mut stmt = db.prepare(&format!(
            "{SELECT_COLUMNS} ORDER BY group_name, execution_order, created_at"
        ))?;
        let rows = stmt.query_map([], row_to_integration)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    fn get_by_group(&self, group_name: &str) -> Result<Vec<Integration>> {
        let db = lock(&self.db);
        let mut stmt = db.prepare(&format!(
            "{SELECT_COLUMNS} WHERE group_name = ?1 ORDER BY execution_order, created_at"
        ))?;
        let rows = stmt.query_map([group_name], row_to_integration)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Delete an integration and its mappings.
    ///
    /// Schedules are not touched here; callers go through the scheduler so
    /// live triggers are removed as well.
    #[instrument(skip(self))]
    fn delete(&self, id: &str) -> Result<()> {
        let mut db = lock(&self.db);
        let tx = db.transaction()?;
        tx.execute("DELETE FROM mappings WHERE integration_id = ?1", [id])?;
        let n = tx.execute("DELETE FROM integrations WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(StoreError::NotFound {
                entity: "integration",
                id: id.to_string(),
            });
        }
        tx.commit()?;
        info!(integration_id = %id, "integration deleted");
        Ok(())
    }
}

fn check_unique_parameters(mappings: &[MappingSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for m in mappings {
        if !seen.insert(m.target_parameter.as_str()) {
            return Err(StoreError::DuplicateParameter {
                parameter: m.target_parameter.clone(),
            });
        }
    }
    Ok(())
}

fn insert_mappings(
    tx: &rusqlite::Transaction<'_>,
    integration_id: &str,
    mappings: &[MappingSpec],
) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO mappings (id, integration_id, source_column, target_parameter, position)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (position, m) in mappings.iter().enumerate() {
        stmt.execute(rusqlite::params![
            new_id(),
            integration_id,
            m.source_column,
            m.target_parameter,
            position as u32,
        ])?;
    }
    Ok(())
}

fn row_to_integration(row: &rusqlite::Row<'_>) -> rusqlite::Result<Integration> {
    Ok(Integration {
        id: row.get(0)?,
        name: row.get(1)?,
        source_connection_id: row.get(2)?,
        target_connection_id: row.get(3)?,
        source_query: row.get(4)?,
        target_query: row.get(5)?,
        group_name: row.get(6)?,
        execution_order: row.get(7)?,
        created_at: row.get(8)?,
    })
}
