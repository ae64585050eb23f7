use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::AppResult;

/// Job execution context passed to tasks
#[derive(Clone)]
pub struct JobContext {
    pub execution_id: Uuid,
    pub job_name: String,
    pub retry_attempt: u32,
    pub cancellation_token: CancellationToken,
}

impl JobContext {
    pub fn new(job_name: impl Into<String>, cancellation_token: CancellationToken) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            job_name: job_name.into(),
            retry_attempt: 0,
            cancellation_token,
        }
    }
}

/// Result of one cron tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Failed,
    Timeout,
    /// Another tick of the same entry holds the dedup lease.
    Skipped,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Timeout => write!(f, "timeout"),
            JobStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Trait that all periodic tasks must implement
#[async_trait]
pub trait JobTask: Send + Sync {
    /// Identifier for this task type
    fn task_type(&self) -> &'static str;

    /// Execute the task
    async fn execute(&self, ctx: JobContext) -> AppResult<()>;

    /// Optional description
    fn description(&self) -> Option<String> {
        None
    }
}
