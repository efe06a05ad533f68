use relay_core::types::ErrorKind;
use relay_store::StoreError;
use thiserror::Error;

/// Errors surfaced synchronously to whoever manages schedules.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    /// The scheduled job already has a run in flight.
    #[error("scheduled job {job_id} is already running")]
    AlreadyRunning { job_id: String },

    /// Suspended jobs only get a trigger back through resume.
    #[error("scheduled job {job_id} is suspended")]
    Suspended { job_id: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Not started yet, or shutting down.
    #[error("scheduler is not accepting runs")]
    NotRunning,

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("run task failed: {0}")]
    Task(String),
}

impl SchedulerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::InvalidCronExpression { .. } => ErrorKind::InvalidCronExpression,
            SchedulerError::AlreadyRunning { .. } => ErrorKind::AlreadyRunning,
            SchedulerError::NotFound { .. } => ErrorKind::NotFound,
            SchedulerError::Suspended { .. }
            | SchedulerError::NotRunning
            | SchedulerError::Store(_)
            | SchedulerError::Task(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<StoreError> for SchedulerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => SchedulerError::NotFound { entity, id },
            other => SchedulerError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
