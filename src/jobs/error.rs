use thiserror::Error;

use crate::error::AppError;

/// Errors raised while building or starting the cron table.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid cron expression: {0}")]
    InvalidCronExpression(String),

    #[error("Job already registered: {0}")]
    AlreadyExists(String),
}

pub type JobResult<T> = Result<T, JobError>;

impl From<JobError> for AppError {
    fn from(error: JobError) -> Self {
        AppError::Validation {
            field: "jobs".to_string(),
            reason: error.to_string(),
        }
    }
}
