use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::jobs::registry::RegisteredJob;
use crate::jobs::types::{JobContext, JobStatus};
use crate::lease::{ExclusiveLease, LeaseStore};

const DEDUP_KEY_PREFIX: &str = "cron";

/// Executes registered jobs with dedup, retry and timeout
pub struct JobExecutor {
    leases: Arc<dyn LeaseStore>,
}

impl JobExecutor {
    pub fn new(leases: Arc<dyn LeaseStore>) -> Self {
        Self { leases }
    }

    /// Run one tick of `job`.
    pub async fn execute_job(&self, job: &RegisteredJob, shutdown: CancellationToken) -> JobStatus {
        let entry = &job.entry;

        let dedup = match &entry.dedup_key {
            Some(key) => {
                let lease = ExclusiveLease::new(
                    self.leases.clone(),
                    format!("{}:{}", DEDUP_KEY_PREFIX, key),
                    entry.dedup_ttl,
                );
                match lease.try_obtain().await {
                    Ok(true) => Some(lease),
                    Ok(false) => {
                        tracing::debug!(job_name = %entry.name, "Previous tick still running, skipping");
                        return JobStatus::Skipped;
                    }
                    Err(e) => {
                        tracing::error!(job_name = %entry.name, error = %e, "Dedup lease unavailable");
                        return JobStatus::Failed;
                    }
                }
            }
            None => None,
        };

        let status = self.execute_with_retry(job, shutdown).await;

        if let Some(lease) = dedup {
            if let Err(e) = lease.cancel().await {
                tracing::warn!(job_name = %entry.name, error = %e, "Failed to release dedup lease");
            }
        }

        status
    }

    async fn execute_with_retry(&self, job: &RegisteredJob, shutdown: CancellationToken) -> JobStatus {
        let entry = &job.entry;

        for attempt in 0..=entry.retry.max_retries {
            let ctx = JobContext {
                execution_id: Uuid::new_v4(),
                job_name: entry.name.clone(),
                retry_attempt: attempt,
                cancellation_token: shutdown.clone(),
            };
            let execution_id = ctx.execution_id;
            let start_time = Instant::now();

            let result = tokio::time::timeout(entry.timeout, job.task.execute(ctx)).await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            match result {
                Ok(Ok(())) => {
                    tracing::info!(
                        job_name = %entry.name,
                        %execution_id,
                        attempt,
                        duration_ms,
                        "Job succeeded"
                    );
                    return JobStatus::Success;
                }
                Ok(Err(e)) => {
                    tracing::error!(
                        job_name = %entry.name,
                        %execution_id,
                        attempt,
                        duration_ms,
                        error = %e,
                        "Job failed"
                    );

                    if attempt < entry.retry.max_retries {
                        let delay = entry.retry.delay_for(attempt);
                        tokio::select! {
                            _ = shutdown.cancelled() => return JobStatus::Failed,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
                Err(_) => {
                    tracing::error!(
                        job_name = %entry.name,
                        %execution_id,
                        timeout_secs = entry.timeout.as_secs(),
                        "Job timed out"
                    );
                    return JobStatus::Timeout;
                }
            }
        }

        JobStatus::Failed
    }
}
