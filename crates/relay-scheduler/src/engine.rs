use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use relay_core::config::{GroupFailurePolicy, SchedulerConfig};
use relay_core::types::{Integration, RunOutcome, ScheduledJob};
use relay_store::{IntegrationStore, ScheduledJobStore};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::runner::IntegrationRunner;
use crate::schedule::CronSchedule;
use crate::types::{DrainReport, LiveTrigger, ReconcileReport};

/// One live cron trigger, keyed by scheduled job id in the trigger table.
struct Trigger {
    handle: String,
    integration_id: String,
    schedule: CronSchedule,
    next_fire: Option<DateTime<Utc>>,
}

struct Inner {
    jobs: Arc<dyn ScheduledJobStore>,
    integrations: Arc<dyn IntegrationStore>,
    runner: Arc<dyn IntegrationRunner>,
    config: SchedulerConfig,
    /// At most one entry per job id, so re-scheduling replaces.
    triggers: DashMap<String, Trigger>,
    /// Job ids with a run in flight.
    running: DashSet<String>,
    groups: DashMap<String, Arc<AsyncMutex<()>>>,
    tracker: TaskTracker,
    stop_clock: CancellationToken,
    cancel_runs: CancellationToken,
    clock: Mutex<Option<JoinHandle<()>>>,
}

/// Cron scheduler with a live trigger table reconciled against persisted
/// [`ScheduledJob`] rows.
///
/// Cheap to clone; clones share the same state.
///
/// Concurrency rules:
/// - a scheduled job has at most one run in flight. A manual trigger while it
///   runs is rejected with [`SchedulerError::AlreadyRunning`]; a cron tick is
///   skipped with a warning;
/// - members of one group never overlap, whichever path started them.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

/// Marks a job as in flight until dropped.
struct InFlight {
    inner: Arc<Inner>,
    job_id: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.inner.running.remove(&self.job_id);
    }
}

impl Scheduler {
    pub fn new(
        jobs: Arc<dyn ScheduledJobStore>,
        integrations: Arc<dyn IntegrationStore>,
        runner: Arc<dyn IntegrationRunner>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs,
                integrations,
                runner,
                config,
                triggers: DashMap::new(),
                running: DashSet::new(),
                groups: DashMap::new(),
                tracker: TaskTracker::new(),
                stop_clock: CancellationToken::new(),
                cancel_runs: CancellationToken::new(),
                clock: Mutex::new(None),
            }),
        }
    }

    /// Reconcile with the store, then start the cron clock.
    ///
    /// Manual triggers are refused until this has returned.
    pub fn start(&self) -> Result<ReconcileReport> {
        if self.inner.stop_clock.is_cancelled() {
            return Err(SchedulerError::NotRunning);
        }
        let report = self.reconcile()?;
        let mut clock = self.inner.clock.lock().unwrap_or_else(|p| p.into_inner());
        if clock.is_none() {
            *clock = Some(self.spawn_clock());
        }
        info!(
            scheduled = report.scheduled,
            discarded = report.discarded,
            invalid = report.invalid,
            dangling = report.dangling,
            "scheduler started"
        );
        Ok(report)
    }

    /// Make the live trigger table match the active, non-suspended rows.
    ///
    /// Triggers already live with the row's expression are left alone, so
    /// running this again is cheap and does not reset their next fire time.
    /// Rows whose expression no longer parses or whose integration is gone
    /// get no trigger and have their stored handle cleared.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let rows = self.inner.jobs.get_all_active()?;
        let wanted: HashSet<&str> = rows.iter().map(|j| j.id.as_str()).collect();

        let mut report = ReconcileReport::default();
        self.inner.triggers.retain(|job_id, trigger| {
            let keep = wanted.contains(job_id.as_str());
            if !keep {
                debug!(%job_id, handle = %trigger.handle, "discarding stale trigger");
                report.discarded += 1;
            }
            keep
        });

        for job in &rows {
            if self.inner.integrations.get_by_id(&job.integration_id)?.is_none() {
                warn!(job_id = %job.id, integration_id = %job.integration_id, "schedule points at a missing integration");
                self.drop_trigger(&job.id)?;
                report.dangling += 1;
                continue;
            }
            let unchanged = self
                .inner
                .triggers
                .get(&job.id)
                .is_some_and(|t| t.schedule.expression() == job.cron_expression.trim());
            if unchanged {
                report.scheduled += 1;
                continue;
            }
            match self.schedule_job(&job.id, &job.cron_expression) {
                Ok(_) => report.scheduled += 1,
                Err(e @ SchedulerError::InvalidCronExpression { .. }) => {
                    warn!(job_id = %job.id, error = %e, "stored schedule is not a valid cron expression");
                    self.drop_trigger(&job.id)?;
                    report.invalid += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Register (or replace) the live trigger of a scheduled job and store
    /// its new handle on the row.
    ///
    /// A new expression is written to the row as well, so a later reconcile
    /// keeps it. Suspended jobs are refused; resume them instead.
    #[instrument(skip(self))]
    pub fn schedule_job(&self, job_id: &str, cron_expression: &str) -> Result<String> {
        let schedule = CronSchedule::parse(cron_expression)?;
        let job = self.job(job_id)?;
        if job.suspended {
            return Err(SchedulerError::Suspended {
                job_id: job_id.to_string(),
            });
        }
        if job.cron_expression.trim() != schedule.expression() {
            self.inner.jobs.set_cron_expression(job_id, schedule.expression())?;
        }

        let handle = format!("trg-{}", Uuid::new_v4());
        let next_fire = schedule.next_after(Utc::now());
        self.inner.triggers.insert(
            job_id.to_string(),
            Trigger {
                handle: handle.clone(),
                integration_id: job.integration_id,
                schedule,
                next_fire,
            },
        );
        if let Err(e) = self.inner.jobs.set_trigger_handle(job_id, Some(&handle)) {
            self.inner.triggers.remove(job_id);
            return Err(e.into());
        }
        info!(%handle, next_fire = ?next_fire, "trigger registered");
        Ok(handle)
    }

    /// Remove a live trigger by handle. Unknown handles are a no-op.
    pub fn remove_job(&self, handle: &str) {
        let mut removed = None;
        self.inner.triggers.retain(|job_id, t| {
            if t.handle == handle {
                removed = Some(job_id.clone());
                false
            } else {
                true
            }
        });
        match removed {
            Some(job_id) => info!(%job_id, %handle, "trigger removed"),
            None => debug!(%handle, "no live trigger for handle"),
        }
    }

    /// Run a scheduled job's integration now, outside its cron cadence.
    ///
    /// The run is spawned and its handle returned; awaiting it yields the
    /// outcome. Fails with `AlreadyRunning` while the job has a run in flight.
    #[instrument(skip(self))]
    pub fn trigger_job_now(&self, job_id: &str) -> Result<JoinHandle<RunOutcome>> {
        self.ensure_running()?;
        let job = self.job(job_id)?;
        let guard = self
            .begin(job_id)
            .ok_or_else(|| SchedulerError::AlreadyRunning {
                job_id: job_id.to_string(),
            })?;
        info!(integration_id = %job.integration_id, "manual trigger accepted");
        Ok(self.spawn_run(job.integration_id, guard))
    }

    /// Validate, persist and arm a new schedule for an integration.
    ///
    /// An invalid expression fails before anything is written.
    #[instrument(skip(self))]
    pub fn create_schedule(&self, integration_id: &str, cron_expression: &str) -> Result<ScheduledJob> {
        CronSchedule::parse(cron_expression)?;
        if self.inner.integrations.get_by_id(integration_id)?.is_none() {
            return Err(SchedulerError::NotFound {
                entity: "integration",
                id: integration_id.to_string(),
            });
        }

        let mut job = self.inner.jobs.create(integration_id, cron_expression.trim())?;
        match self.schedule_job(&job.id, &job.cron_expression) {
            Ok(handle) => job.trigger_handle = Some(handle),
            Err(e) => {
                // Leave no row behind without its trigger.
                self.inner.jobs.delete(&job.id)?;
                return Err(e);
            }
        }
        Ok(job)
    }

    /// Delete the row, then the live trigger. The trigger goes even if the
    /// row was already gone. Returns whether a row existed.
    #[instrument(skip(self))]
    pub fn delete_schedule(&self, job_id: &str) -> Result<bool> {
        let existed = self.inner.jobs.delete(job_id)?;
        if let Some((_, trigger)) = self.inner.triggers.remove(job_id) {
            info!(handle = %trigger.handle, "trigger removed");
        }
        Ok(existed)
    }

    /// Stop firing a job without deleting it.
    pub fn suspend_schedule(&self, job_id: &str) -> Result<()> {
        self.job(job_id)?;
        self.inner.jobs.set_suspended(job_id, true)?;
        self.drop_trigger(job_id)?;
        info!(%job_id, "schedule suspended");
        Ok(())
    }

    /// Re-arm a suspended job from its stored expression.
    pub fn resume_schedule(&self, job_id: &str) -> Result<String> {
        let job = self.job(job_id)?;
        self.inner.jobs.set_suspended(job_id, false)?;
        let handle = self.schedule_job(job_id, &job.cron_expression)?;
        info!(%job_id, "schedule resumed");
        Ok(handle)
    }

    /// Delete an integration together with every schedule bound to it.
    #[instrument(skip(self))]
    pub fn delete_integration(&self, integration_id: &str) -> Result<()> {
        for job in self.inner.jobs.get_by_integration_id(integration_id)? {
            self.delete_schedule(&job.id)?;
        }
        self.inner.integrations.delete(integration_id)?;
        Ok(())
    }

    /// Run one integration now and wait for its outcome. Takes the
    /// integration's group lock like any other run.
    pub async fn run_integration(&self, integration_id: &str) -> Result<RunOutcome> {
        self.ensure_open()?;
        let this = self.clone();
        let id = integration_id.to_string();
        self.inner
            .tracker
            .spawn(async move { this.run_with_group_lock(&id).await })
            .await
            .map_err(|e| SchedulerError::Task(e.to_string()))
    }

    /// Run every member of a group in ascending execution order, one at a
    /// time. What a failure does to later members follows
    /// `group_failure_policy`.
    #[instrument(skip(self))]
    pub async fn run_group(&self, group: &str) -> Result<Vec<RunOutcome>> {
        self.ensure_open()?;
        let members = self.inner.integrations.get_by_group(group)?;
        if members.is_empty() {
            return Err(SchedulerError::NotFound {
                entity: "group",
                id: group.to_string(),
            });
        }
        let this = self.clone();
        let group = group.to_string();
        self.inner
            .tracker
            .spawn(async move { this.run_group_members(&group, members).await })
            .await
            .map_err(|e| SchedulerError::Task(e.to_string()))
    }

    /// Stop the clock, wait up to `timeout` for in-flight runs, then cancel
    /// whatever is left and wait for those runs to log their cancellation.
    pub async fn shutdown(&self, timeout: Duration) -> DrainReport {
        info!("scheduler shutting down");
        self.inner.stop_clock.cancel();
        let clock = self.inner.clock.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(clock) = clock {
            let _ = clock.await;
        }

        self.inner.tracker.close();
        let in_flight = self.inner.tracker.len();
        let timed_out = tokio::time::timeout(timeout, self.inner.tracker.wait())
            .await
            .is_err();
        if timed_out {
            warn!(
                remaining = self.inner.tracker.len(),
                "drain timed out, cancelling in-flight runs"
            );
            self.inner.cancel_runs.cancel();
            self.inner.tracker.wait().await;
        }
        info!(in_flight, timed_out, "scheduler stopped");
        DrainReport { in_flight, timed_out }
    }

    /// Live triggers ordered by job id.
    pub fn live_triggers(&self) -> Vec<LiveTrigger> {
        let mut out: Vec<LiveTrigger> = self
            .inner
            .triggers
            .iter()
            .map(|e| LiveTrigger {
                job_id: e.key().clone(),
                integration_id: e.integration_id.clone(),
                handle: e.handle.clone(),
                cron_expression: e.schedule.expression().to_string(),
                next_fire: e.next_fire,
            })
            .collect();
        out.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        out
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.inner.running.contains(job_id)
    }

    // --- private helpers ---------------------------------------------------

    fn job(&self, job_id: &str) -> Result<ScheduledJob> {
        self.inner
            .jobs
            .get_by_id(job_id)?
            .ok_or_else(|| SchedulerError::NotFound {
                entity: "scheduled job",
                id: job_id.to_string(),
            })
    }

    fn drop_trigger(&self, job_id: &str) -> Result<()> {
        self.inner.triggers.remove(job_id);
        self.inner.jobs.set_trigger_handle(job_id, None)?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.stop_clock.is_cancelled() {
            Err(SchedulerError::NotRunning)
        } else {
            Ok(())
        }
    }

    fn ensure_running(&self) -> Result<()> {
        self.ensure_open()?;
        let started = self.inner.clock.lock().unwrap_or_else(|p| p.into_inner()).is_some();
        if started {
            Ok(())
        } else {
            Err(SchedulerError::NotRunning)
        }
    }

    fn begin(&self, job_id: &str) -> Option<InFlight> {
        self.inner.running.insert(job_id.to_string()).then(|| InFlight {
            inner: Arc::clone(&self.inner),
            job_id: job_id.to_string(),
        })
    }

    fn spawn_run(&self, integration_id: String, guard: InFlight) -> JoinHandle<RunOutcome> {
        let this = self.clone();
        self.inner.tracker.spawn(async move {
            let _guard = guard;
            this.run_with_group_lock(&integration_id).await
        })
    }

    fn group_lock(&self, group: &str) -> Arc<AsyncMutex<()>> {
        self.inner.groups.entry(group.to_string()).or_default().clone()
    }

    /// Wait for the group lock, or give up waiting once runs are being
    /// cancelled; the runner then records the cancellation.
    async fn lock_group(&self, group: &str) -> Option<OwnedMutexGuard<()>> {
        let lock = self.group_lock(group);
        tokio::select! {
            biased;
            _ = self.inner.cancel_runs.cancelled() => None,
            guard = lock.lock_owned() => Some(guard),
        }
    }

    async fn run_with_group_lock(&self, integration_id: &str) -> RunOutcome {
        let group = match self.inner.integrations.get_by_id(integration_id) {
            Ok(found) => found.and_then(|r| r.integration.group_name),
            Err(e) => {
                warn!(%integration_id, error = %e, "could not look up integration group");
                None
            }
        };
        let Some(group) = group else {
            return self.inner.runner.run(integration_id, &self.inner.cancel_runs).await;
        };
        let guard = self.lock_group(&group).await;
        let outcome = self.inner.runner.run(integration_id, &self.inner.cancel_runs).await;
        drop(guard);
        self.release_group(&group);
        outcome
    }

    async fn run_group_members(&self, group: &str, members: Vec<Integration>) -> Vec<RunOutcome> {
        let guard = self.lock_group(group).await;
        let mut outcomes = Vec::with_capacity(members.len());
        for (i, member) in members.iter().enumerate() {
            let outcome = self.inner.runner.run(&member.id, &self.inner.cancel_runs).await;
            let failed = !outcome.success;
            outcomes.push(outcome);
            if failed && self.inner.config.group_failure_policy == GroupFailurePolicy::Stop {
                warn!(
                    %group,
                    failed = %member.id,
                    skipped = members.len() - i - 1,
                    "group stopped after failure"
                );
                break;
            }
        }
        drop(guard);
        self.release_group(group);
        info!(%group, runs = outcomes.len(), "group run finished");
        outcomes
    }

    /// Forget a group's lock once no run holds or waits on it. Checked under
    /// the map's shard lock, the same one `group_lock` clones under.
    fn release_group(&self, group: &str) {
        self.inner
            .groups
            .remove_if(group, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn spawn_clock(&self) -> JoinHandle<()> {
        let this = self.clone();
        let tick = Duration::from_millis(self.inner.config.tick_interval_ms.max(10));
        tokio::spawn(async move {
            debug!(tick_ms = tick.as_millis() as u64, "scheduler clock started");
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        this.fire_due(Utc::now());
                    }
                    _ = this.inner.stop_clock.cancelled() => {
                        debug!("scheduler clock stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Fire every trigger due at `now` and advance it. Returns how many runs
    /// were started.
    fn fire_due(&self, now: DateTime<Utc>) -> usize {
        let mut due = Vec::new();
        for mut entry in self.inner.triggers.iter_mut() {
            if entry.next_fire.is_some_and(|at| at <= now) {
                let next = entry.schedule.next_after(now);
                entry.next_fire = next;
                due.push((entry.key().clone(), entry.integration_id.clone()));
            }
        }

        let mut fired = 0;
        for (job_id, integration_id) in due {
            match self.begin(&job_id) {
                Some(guard) => {
                    debug!(%job_id, %integration_id, "cron trigger fired");
                    drop(self.spawn_run(integration_id, guard));
                    fired += 1;
                }
                None => warn!(%job_id, "previous run still in flight, tick skipped"),
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use relay_core::types::{DatabaseKind, NewIntegration};
    use relay_store::{db, ConnectionRepo, IntegrationRepo, ScheduledJobRepo};
    use tokio::sync::Notify;

    use super::*;

    /// Counts runs; each run waits on `gate` unless it is opened.
    struct GatedRunner {
        calls: AtomicUsize,
        gate: Notify,
    }

    #[async_trait]
    impl IntegrationRunner for GatedRunner {
        async fn run(&self, integration_id: &str, cancel: &CancellationToken) -> RunOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::select! {
                _ = self.gate.notified() => {}
                _ = cancel.cancelled() => {}
            }
            RunOutcome {
                integration_id: integration_id.to_string(),
                success: true,
                row_count: 0,
                duration_ms: 0,
                message: None,
                error_kind: None,
                error_detail: None,
                log_id: None,
            }
        }
    }

    fn fixture() -> (Scheduler, Arc<GatedRunner>, String) {
        fixture_in_group(None)
    }

    fn fixture_in_group(group: Option<&str>) -> (Scheduler, Arc<GatedRunner>, String) {
        let shared = db::open_in_memory().unwrap();
        let connections = ConnectionRepo::new(shared.clone());
        let integrations = Arc::new(IntegrationRepo::new(shared.clone()));
        let jobs = Arc::new(ScheduledJobRepo::new(shared));
        let c = connections.create("c", DatabaseKind::Sqlite, ":memory:").unwrap();
        let integration = integrations
            .create(NewIntegration {
                name: "i".into(),
                source_connection_id: c.id.clone(),
                target_connection_id: c.id,
                source_query: "SELECT 1".into(),
                target_query: "SELECT 1".into(),
                group_name: group.map(String::from),
                execution_order: 0,
                mappings: vec![],
            })
            .unwrap();
        let runner = Arc::new(GatedRunner {
            calls: AtomicUsize::new(0),
            gate: Notify::new(),
        });
        let scheduler = Scheduler::new(jobs, integrations, runner.clone(), SchedulerConfig::default());
        (scheduler, runner, integration.id)
    }

    #[tokio::test]
    async fn rescheduling_the_same_job_fires_once_per_tick() {
        let (scheduler, runner, integration_id) = fixture();
        let job = scheduler.create_schedule(&integration_id, "* * * * * *").unwrap();
        scheduler.schedule_job(&job.id, "* * * * * *").unwrap();
        assert_eq!(scheduler.live_triggers().len(), 1);

        let fired = scheduler.fire_due(Utc::now() + chrono::Duration::seconds(5));
        assert_eq!(fired, 1);
        tokio::task::yield_now().await;
        runner.gate.notify_one();
        scheduler.shutdown(Duration::from_secs(5)).await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tick_is_skipped_while_previous_run_is_in_flight() {
        let (scheduler, runner, integration_id) = fixture();
        let job = scheduler.create_schedule(&integration_id, "* * * * * *").unwrap();

        let later = Utc::now() + chrono::Duration::seconds(5);
        assert_eq!(scheduler.fire_due(later), 1);
        assert!(scheduler.is_running(&job.id));
        assert_eq!(scheduler.fire_due(later + chrono::Duration::seconds(5)), 0);

        let report = scheduler.shutdown(Duration::from_millis(50)).await;
        assert!(report.timed_out);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_running(&job.id));
    }

    #[tokio::test]
    async fn trigger_before_start_is_refused() {
        let (scheduler, _runner, integration_id) = fixture();
        let job = scheduler.create_schedule(&integration_id, "@daily").unwrap();
        let err = scheduler.trigger_job_now(&job.id).unwrap_err();
        assert!(matches!(err, SchedulerError::NotRunning));
    }

    #[tokio::test]
    async fn removing_an_old_handle_keeps_the_replacement() {
        let (scheduler, _runner, integration_id) = fixture();
        let job = scheduler.create_schedule(&integration_id, "@hourly").unwrap();
        let old = job.trigger_handle.unwrap();
        let new = scheduler.schedule_job(&job.id, "@daily").unwrap();
        assert_ne!(old, new);

        scheduler.remove_job(&old);
        let live = scheduler.live_triggers();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].handle, new);
        assert_eq!(live[0].cron_expression, "@daily");

        // The row follows the replacement, so reconciling leaves it alone.
        let report = scheduler.reconcile().unwrap();
        assert_eq!(report.scheduled, 1);
        let live = scheduler.live_triggers();
        assert_eq!(live[0].handle, new);
        assert_eq!(live[0].cron_expression, "@daily");
        let row = scheduler.inner.jobs.get_by_id(&job.id).unwrap().unwrap();
        assert_eq!(row.cron_expression, "@daily");
        assert_eq!(row.trigger_handle.as_deref(), Some(new.as_str()));
    }

    #[tokio::test]
    async fn suspended_job_cannot_be_armed_directly() {
        let (scheduler, _runner, integration_id) = fixture();
        let job = scheduler.create_schedule(&integration_id, "@hourly").unwrap();
        scheduler.suspend_schedule(&job.id).unwrap();

        let err = scheduler.schedule_job(&job.id, "@daily").unwrap_err();
        assert!(matches!(err, SchedulerError::Suspended { .. }));
        assert!(scheduler.live_triggers().is_empty());
        let row = scheduler.inner.jobs.get_by_id(&job.id).unwrap().unwrap();
        assert_eq!(row.cron_expression, "@hourly");

        scheduler.resume_schedule(&job.id).unwrap();
        assert_eq!(scheduler.live_triggers().len(), 1);
    }

    #[tokio::test]
    async fn group_lock_is_forgotten_once_the_run_ends() {
        let (scheduler, runner, integration_id) = fixture_in_group(Some("nightly"));

        let run = {
            let scheduler = scheduler.clone();
            let id = integration_id.clone();
            tokio::spawn(async move { scheduler.run_integration(&id).await })
        };
        while runner.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(scheduler.inner.groups.len(), 1);

        runner.gate.notify_one();
        assert!(run.await.unwrap().unwrap().success);
        assert!(scheduler.inner.groups.is_empty());

        runner.gate.notify_one();
        assert_eq!(scheduler.run_group("nightly").await.unwrap().len(), 1);
        assert!(scheduler.inner.groups.is_empty());
    }
}
