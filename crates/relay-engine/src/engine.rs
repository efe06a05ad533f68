use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{FutureExt, StreamExt};
use relay_core::config::EngineConfig;
use relay_core::types::{
    mask_connection_string, new_id, now_rfc3339, Connection, IntegrationLog, ResolvedIntegration,
    RunOutcome,
};
use relay_store::{IntegrationStore, RunLogStore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::driver::{DbSession, Row, RowStream};
use crate::error::RunError;
use crate::mapping::MappingPlan;
use crate::notify::RunNotifier;
use crate::secrets::{PlainSecrets, SecretResolver};

/// Runs integrations end to end and records exactly one log row per call.
///
/// Every failure, including a panic inside a driver, is folded into a failed
/// [`RunOutcome`]; `execute` itself never fails.
pub struct ExecutionEngine {
    integrations: Arc<dyn IntegrationStore>,
    logs: Arc<dyn RunLogStore>,
    secrets: Arc<dyn SecretResolver>,
    notifiers: Vec<Arc<dyn RunNotifier>>,
    /// Notifier calls still in progress.
    notifications: TaskTracker,
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(
        integrations: Arc<dyn IntegrationStore>,
        logs: Arc<dyn RunLogStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            integrations,
            logs,
            secrets: Arc::new(PlainSecrets),
            notifiers: Vec::new(),
            notifications: TaskTracker::new(),
            config,
        }
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretResolver>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn RunNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Wait up to `timeout` for notifier calls already started. Returns
    /// `false` if some were still running when the time ran out; those are
    /// dropped with the runtime.
    pub async fn flush_notifications(&self, timeout: Duration) -> bool {
        self.notifications.close();
        let done = tokio::time::timeout(timeout, self.notifications.wait()).await.is_ok();
        self.notifications.reopen();
        if !done {
            warn!(pending = self.notifications.len(), "run notifications still pending");
        }
        done
    }

    /// Load an integration by id and run it.
    ///
    /// An unknown id or a store failure is still a run attempt: it is logged
    /// against `integration_id` and returned as a failed outcome.
    pub async fn execute_by_id(&self, integration_id: &str, cancel: &CancellationToken) -> RunOutcome {
        match self.integrations.get_by_id(integration_id) {
            Ok(Some(resolved)) => self.execute(&resolved, cancel).await,
            Ok(None) => {
                let run_at = now_rfc3339();
                let err = RunError::NotFound(integration_id.to_string());
                self.finish(integration_id, run_at, Instant::now(), 0, Err(err)).await
            }
            Err(e) => {
                let run_at = now_rfc3339();
                self.finish(integration_id, run_at, Instant::now(), 0, Err(e.into())).await
            }
        }
    }

    /// Run one resolved integration.
    ///
    /// `cancel` aborts the run at its next suspension point (opening a
    /// connection, reading a source row, writing a target row). A cancelled
    /// run is logged with kind `Cancelled` and the rows written so far.
    #[instrument(skip_all, fields(integration_id = %resolved.integration.id, name = %resolved.integration.name))]
    pub async fn execute(&self, resolved: &ResolvedIntegration, cancel: &CancellationToken) -> RunOutcome {
        let run_at = now_rfc3339();
        let started = Instant::now();
        let mut rows = 0u64;

        let result = AssertUnwindSafe(self.transfer(resolved, cancel, &mut rows))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(RunError::Panicked(panic_message(payload))));

        self.finish(&resolved.integration.id, run_at, started, rows, result)
            .await
    }

    async fn transfer(
        &self,
        resolved: &ResolvedIntegration,
        cancel: &CancellationToken,
        rows: &mut u64,
    ) -> Result<(), RunError> {
        // Both ends are checked before anything touches the network.
        check_active("source", &resolved.source)?;
        check_active("target", &resolved.target)?;

        let source = self.open("source", &resolved.source, cancel).await?;
        let mut target = self.open("target", &resolved.target, cancel).await?;

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunError::Cancelled { rows: 0 }),
            res = source.fetch(&resolved.integration.source_query, self.config.row_buffer) => {
                res.map_err(RunError::SourceQuery)?
            }
        };

        let Some(first) = next_row(&mut stream, cancel, 0).await? else {
            debug!("source query returned no rows");
            return Ok(());
        };
        // Column names are the same for every row of one result.
        let plan = MappingPlan::resolve(&resolved.mappings, first.columns())?;
        let target_query = &resolved.integration.target_query;

        let mut pending = Some(first);
        loop {
            let row = match pending.take() {
                Some(row) => row,
                None => match next_row(&mut stream, cancel, *rows).await? {
                    Some(row) => row,
                    None => break,
                },
            };
            let params = plan.bind(&row)?;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RunError::Cancelled { rows: *rows }),
                res = target.execute(target_query, &params) => {
                    res.map_err(|source| RunError::TargetQuery { row: *rows + 1, source })?;
                }
            }
            *rows += 1;
        }
        Ok(())
    }

    async fn open(
        &self,
        side: &'static str,
        connection: &Connection,
        cancel: &CancellationToken,
    ) -> Result<DbSession, RunError> {
        let revealed = self.secrets.reveal(connection)?;
        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunError::Cancelled { rows: 0 }),
            res = tokio::time::timeout(timeout, DbSession::open(connection.kind, &revealed)) => res,
        };
        match opened {
            Ok(Ok(session)) => {
                debug!(side, connection = %connection.name, kind = %connection.kind, "session opened");
                Ok(session)
            }
            Ok(Err(e)) => match RunError::from_open(side, e) {
                // Drivers may echo the connection string back.
                RunError::ConnectionFailed { side, reason } if !revealed.is_empty() => {
                    Err(RunError::ConnectionFailed {
                        side,
                        reason: reason.replace(&revealed, &mask_connection_string(&revealed)),
                    })
                }
                other => Err(other),
            },
            Err(_) => Err(RunError::ConnectionFailed {
                side,
                reason: format!("timed out after {}s", timeout.as_secs()),
            }),
        }
    }

    /// Build the outcome, append its log row and hand the row to notifiers.
    async fn finish(
        &self,
        integration_id: &str,
        run_at: String,
        started: Instant,
        rows: u64,
        result: Result<(), RunError>,
    ) -> RunOutcome {
        let duration_ms = started.elapsed().as_millis() as u64;
        let mut outcome = match &result {
            Ok(()) => RunOutcome {
                integration_id: integration_id.to_string(),
                success: true,
                row_count: rows,
                duration_ms,
                message: Some(format!("transferred {rows} rows")),
                error_kind: None,
                error_detail: None,
                log_id: None,
            },
            Err(e) => RunOutcome {
                integration_id: integration_id.to_string(),
                success: false,
                row_count: rows,
                duration_ms,
                message: Some(e.to_string()),
                error_kind: Some(e.kind()),
                error_detail: Some(e.detail()),
                log_id: None,
            },
        };

        match &result {
            Ok(()) => info!(integration_id, rows, duration_ms, "integration run finished"),
            Err(e) => warn!(
                integration_id,
                rows,
                duration_ms,
                kind = %e.kind(),
                error = %e,
                "integration run failed"
            ),
        }

        let log = outcome.to_log(new_id(), run_at);
        match self.logs.append(&log) {
            Ok(()) => {
                outcome.log_id = Some(log.id.clone());
                self.notify(log);
            }
            Err(e) => error!(integration_id, error = %e, "failed to append run log"),
        }
        outcome
    }

    fn notify(&self, log: IntegrationLog) {
        if self.notifiers.is_empty() {
            return;
        }
        let log = Arc::new(log);
        for notifier in &self.notifiers {
            let notifier = Arc::clone(notifier);
            let log = Arc::clone(&log);
            self.notifications.spawn(async move {
                if let Err(e) = notifier.notify(&log).await {
                    warn!(notifier = notifier.name(), log_id = %log.id, error = %e, "run notifier failed");
                }
            });
        }
    }
}

fn check_active(side: &'static str, connection: &Connection) -> Result<(), RunError> {
    if connection.is_active {
        Ok(())
    } else {
        Err(RunError::InactiveConnection {
            side,
            id: connection.id.clone(),
            name: connection.name.clone(),
        })
    }
}

async fn next_row(
    stream: &mut RowStream,
    cancel: &CancellationToken,
    rows: u64,
) -> Result<Option<Row>, RunError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunError::Cancelled { rows }),
        next = stream.next() => next.transpose().map_err(RunError::SourceQuery),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
