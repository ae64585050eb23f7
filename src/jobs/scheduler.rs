use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler as TokioCronScheduler};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::jobs::error::JobError;
use crate::jobs::executor::JobExecutor;
use crate::jobs::registry::{JobRegistry, RegisteredJob};
use crate::lease::LeaseStore;

/// Wrapper around tokio-cron-scheduler driven by an explicit registry
pub struct JobScheduler {
    scheduler: Arc<Mutex<TokioCronScheduler>>,
    executor: Arc<JobExecutor>,
    registry: Arc<JobRegistry>,
    shutdown: CancellationToken,
}

impl JobScheduler {
    pub async fn new(
        registry: JobRegistry,
        leases: Arc<dyn LeaseStore>,
        shutdown: CancellationToken,
    ) -> AppResult<Self> {
        let scheduler = TokioCronScheduler::new()
            .await
            .map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e),
            })?;

        Ok(Self {
            scheduler: Arc::new(Mutex::new(scheduler)),
            executor: Arc::new(JobExecutor::new(leases)),
            registry: Arc::new(registry),
            shutdown,
        })
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Register every enabled entry and start ticking
    pub async fn start(&self) -> AppResult<()> {
        for job in self.registry.enabled() {
            self.schedule_job(job.clone()).await?;
        }

        self.scheduler
            .lock()
            .await
            .start()
            .await
            .map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e),
            })?;

        tracing::info!(jobs = ?self.registry.names(), "Job scheduler started");
        Ok(())
    }

    /// Stop the scheduler gracefully
    pub async fn stop(&self) -> AppResult<()> {
        self.shutdown.cancel();
        self.scheduler
            .lock()
            .await
            .shutdown()
            .await
            .map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e),
            })?;
        Ok(())
    }

    async fn schedule_job(&self, job: Arc<RegisteredJob>) -> AppResult<()> {
        tracing::debug!(
            job_name = %job.entry.name,
            task_type = job.task.task_type(),
            cron = %job.entry.cron_expression,
            description = job.task.description().as_deref().unwrap_or(""),
            "Scheduling job"
        );

        let executor = Arc::clone(&self.executor);
        let shutdown = self.shutdown.clone();
        let cron_expression = job.entry.cron_expression.clone();

        let cron_job = Job::new_async(cron_expression.as_str(), move |_uuid, _lock| {
            let executor = Arc::clone(&executor);
            let job = Arc::clone(&job);
            let shutdown = shutdown.clone();

            Box::pin(async move {
                if shutdown.is_cancelled() {
                    return;
                }
                let status = executor.execute_job(&job, shutdown).await;
                tracing::debug!(job_name = %job.entry.name, %status, "Cron tick finished");
            })
        })
        .map_err(|e| JobError::InvalidCronExpression(format!("{}: {}", cron_expression, e)))?;

        self.scheduler
            .lock()
            .await
            .add(cron_job)
            .await
            .map_err(|e| AppError::Internal {
                source: anyhow::Error::from(e),
            })?;

        Ok(())
    }
}
