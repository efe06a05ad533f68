//! `relay-store`: SQLite persistence for connections, integrations and
//! their mappings, scheduled jobs and the run log.
//!
//! The [`store`] traits are the contracts the engine and scheduler depend on;
//! the `*Repo` types are their SQLite implementations plus the thin CRUD the
//! host needs.

pub mod connections;
pub mod db;
pub mod error;
pub mod integrations;
pub mod run_log;
pub mod scheduled_jobs;
pub mod store;

pub use connections::ConnectionRepo;
pub use db::SharedDb;
pub use error::{Result, StoreError};
pub use integrations::IntegrationRepo;
pub use run_log::RunLogRepo;
pub use scheduled_jobs::ScheduledJobRepo;
pub use store::{ConnectionStore, IntegrationStore, RunLogStore, ScheduledJobStore};
