//! `relay-scheduler`: cron-driven and manual runs of integrations.
//!
//! # Overview
//!
//! [`Scheduler`] keeps a live trigger table keyed by scheduled job id and a
//! clock task that evaluates it every `tick_interval_ms`. Persisted
//! [`ScheduledJob`](relay_core::types::ScheduledJob) rows are the source of
//! truth: [`Scheduler::start`] reconciles the table against them before the
//! clock starts or any manual trigger is accepted.
//!
//! # Concurrency
//!
//! | Rule                         | Behaviour                                   |
//! |------------------------------|---------------------------------------------|
//! | One run per scheduled job    | manual trigger → `AlreadyRunning`; cron tick → skipped |
//! | One run per group            | members wait on the group lock, in order    |
//! | Shutdown                     | drain up to a timeout, then cancel the rest |

pub mod engine;
pub mod error;
pub mod runner;
pub mod schedule;
pub mod types;

pub use engine::Scheduler;
pub use error::{Result, SchedulerError};
pub use runner::IntegrationRunner;
pub use schedule::CronSchedule;
pub use types::{DrainReport, LiveTrigger, ReconcileReport};
