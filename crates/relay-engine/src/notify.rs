use async_trait::async_trait;
use relay_core::types::IntegrationLog;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Receives a copy of every run log after it has been written.
///
/// Calls are fire-and-forget: the engine spawns each one on its own task, so
/// a slow, failing or panicking notifier never changes a run's outcome.
#[async_trait]
pub trait RunNotifier: Send + Sync {
    /// Short identifier used in log lines.
    fn name(&self) -> &str;

    async fn notify(&self, log: &IntegrationLog) -> Result<(), NotifyError>;
}

/// Emits one structured tracing event per finished run.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl RunNotifier for TracingNotifier {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn notify(&self, log: &IntegrationLog) -> Result<(), NotifyError> {
        if log.success {
            info!(
                integration_id = %log.integration_id,
                log_id = %log.id,
                rows = log.row_count,
                duration_ms = log.duration_ms,
                "integration run succeeded"
            );
        } else {
            warn!(
                integration_id = %log.integration_id,
                log_id = %log.id,
                rows = log.row_count,
                duration_ms = log.duration_ms,
                kind = log.error_kind.map(|k| k.code()).unwrap_or("UNKNOWN"),
                message = log.message.as_deref().unwrap_or_default(),
                "integration run failed"
            );
        }
        Ok(())
    }
}
