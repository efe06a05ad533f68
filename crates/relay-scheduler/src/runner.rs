use async_trait::async_trait;
use relay_core::types::RunOutcome;
use relay_engine::ExecutionEngine;
use tokio_util::sync::CancellationToken;

/// Whatever actually runs an integration when a trigger fires.
///
/// Implementations must always return an outcome and record the run
/// themselves; the scheduler only decides when and how many at once.
#[async_trait]
pub trait IntegrationRunner: Send + Sync {
    async fn run(&self, integration_id: &str, cancel: &CancellationToken) -> RunOutcome;
}

#[async_trait]
impl IntegrationRunner for ExecutionEngine {
    async fn run(&self, integration_id: &str, cancel: &CancellationToken) -> RunOutcome {
        self.execute_by_id(integration_id, cancel).await
    }
}
