use chrono::{DateTime, Utc};

/// Snapshot of one live trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTrigger {
    pub job_id: String,
    pub integration_id: String,
    /// Opaque handle handed out by `schedule_job`.
    pub handle: String,
    pub cron_expression: String,
    /// `None` once the expression has no future occurrence.
    pub next_fire: Option<DateTime<Utc>>,
}

/// What the startup reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Active rows that now have a live trigger.
    pub scheduled: usize,
    /// Live triggers with no active row behind them, dropped.
    pub discarded: usize,
    /// Rows whose stored expression no longer parses.
    pub invalid: usize,
    /// Rows pointing at an integration that no longer exists.
    pub dangling: usize,
}

/// Result of a graceful shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Runs still in flight when shutdown began.
    pub in_flight: usize,
    /// Whether the drain timeout elapsed and remaining runs were cancelled.
    pub timed_out: bool,
}
