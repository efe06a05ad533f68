//! Store contracts consumed by the engine and the scheduler.
//!
//! All methods are synchronous: the SQLite implementations hold a mutex for a
//! handful of microseconds, which is fine to call from async code directly.

use relay_core::types::{Connection, Integration, IntegrationLog, ResolvedIntegration, ScheduledJob};

use crate::error::Result;

pub trait ConnectionStore: Send + Sync {
    fn get_by_id(&self, id: &str) -> Result<Option<Connection>>;
    fn get_active(&self) -> Result<Vec<Connection>>;
}

pub trait IntegrationStore: Send + Sync {
    /// Integration with both connections and ordered mappings loaded.
    fn get_by_id(&self, id: &str) -> Result<Option<ResolvedIntegration>>;
    /// Every integration, ordered by group name then execution order.
    fn get_all_grouped_ordered(&self) -> Result<Vec<Integration>>;
    /// Members of one group in ascending execution order.
    fn get_by_group(&self, group_name: &str) -> Result<Vec<Integration>>;
    /// Delete an integration with its mappings. Its schedules are the
    /// caller's to remove first.
    fn delete(&self, id: &str) -> Result<()>;
}

/// Append-only run log. There is deliberately no update method.
pub trait RunLogStore: Send + Sync {
    fn append(&self, log: &IntegrationLog) -> Result<()>;
    fn get_recent(&self, limit: usize) -> Result<Vec<IntegrationLog>>;
    fn get_by_integration_id(&self, integration_id: &str) -> Result<Vec<IntegrationLog>>;
}

pub trait ScheduledJobStore: Send + Sync {
    fn get_by_id(&self, id: &str) -> Result<Option<ScheduledJob>>;
    /// Every non-suspended job.
    fn get_all_active(&self) -> Result<Vec<ScheduledJob>>;
    fn get_by_integration_id(&self, integration_id: &str) -> Result<Vec<ScheduledJob>>;
    fn create(&self, integration_id: &str, cron_expression: &str) -> Result<ScheduledJob>;
    fn set_trigger_handle(&self, id: &str, handle: Option<&str>) -> Result<()>;
    fn set_cron_expression(&self, id: &str, cron_expression: &str) -> Result<()>;
    fn set_suspended(&self, id: &str, suspended: bool) -> Result<()>;
    /// Returns whether a row was actually deleted.
    fn delete(&self, id: &str) -> Result<bool>;
}
