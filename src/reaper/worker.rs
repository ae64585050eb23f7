use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, AppResult};
use crate::jobs::{JobContext, JobTask};
use crate::lease::{ExclusiveLease, LeaseStore};
use crate::reaper::{DropPolicy, ReapSummary, StuckBuildsReaper};

pub const EXCLUSIVE_LEASE_KEY: &str = "stuck_ci_builds_worker_lease";

/// Cron entry point: runs every drop policy under one fleet-wide lease.
pub struct StuckBuildsWorker {
    reaper: Arc<StuckBuildsReaper>,
    policies: Vec<DropPolicy>,
    leases: Arc<dyn LeaseStore>,
    lease_timeout: Duration,
}

impl StuckBuildsWorker {
    pub fn new(
        reaper: Arc<StuckBuildsReaper>,
        policies: Vec<DropPolicy>,
        leases: Arc<dyn LeaseStore>,
        lease_timeout: Duration,
    ) -> Self {
        Self {
            reaper,
            policies,
            leases,
            lease_timeout,
        }
    }

    pub fn policies(&self) -> &[DropPolicy] {
        &self.policies
    }

    /// Run all policies in table order. `None` when another process holds
    /// the worker lease.
    pub async fn perform(&self) -> AppResult<Option<Vec<ReapSummary>>> {
        let policies: Vec<&DropPolicy> = self.policies.iter().collect();
        self.run_leased(&policies).await
    }

    /// Run a single policy by name under the same lease.
    pub async fn perform_policy(&self, name: &str) -> AppResult<Option<ReapSummary>> {
        let policy = self
            .policies
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| AppError::Validation {
                field: "policy".to_string(),
                reason: format!(
                    "unknown drop policy '{}', expected one of: {}",
                    name,
                    self.policies
                        .iter()
                        .map(|p| p.name)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })?;

        let summaries = self.run_leased(&[policy]).await?;
        Ok(summaries.and_then(|mut s| s.pop()))
    }

    async fn run_leased(&self, policies: &[&DropPolicy]) -> AppResult<Option<Vec<ReapSummary>>> {
        let lease = ExclusiveLease::new(self.leases.clone(), EXCLUSIVE_LEASE_KEY, self.lease_timeout);
        if !lease.try_obtain().await? {
            tracing::info!(lease_key = EXCLUSIVE_LEASE_KEY, "Stuck builds worker already running elsewhere");
            return Ok(None);
        }

        let mut summaries = Vec::with_capacity(policies.len());
        for policy in policies {
            match self.reaper.execute(policy).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    tracing::error!(policy = policy.name, error = %e, "Drop policy failed");
                }
            }
        }

        if let Err(e) = lease.cancel().await {
            tracing::warn!(lease_key = EXCLUSIVE_LEASE_KEY, error = %e, "Failed to release lease");
        }

        Ok(Some(summaries))
    }
}

#[async_trait]
impl JobTask for StuckBuildsWorker {
    fn task_type(&self) -> &'static str {
        "stuck_builds"
    }

    async fn execute(&self, ctx: JobContext) -> AppResult<()> {
        if ctx.cancellation_token.is_cancelled() {
            return Ok(());
        }

        if let Some(summaries) = self.perform().await? {
            let transitioned: u64 = summaries.iter().map(ReapSummary::transitioned).sum();
            tracing::info!(
                execution_id = %ctx.execution_id,
                policies = summaries.len(),
                transitioned,
                "Stuck builds worker finished"
            );
        }
        Ok(())
    }

    fn description(&self) -> Option<String> {
        Some("Fail builds stuck in scheduled, pending, running or canceling".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};

    use crate::ci::{Build, BuildStatus, InMemoryBuildStore, StaticRunnerAvailability};
    use crate::clock::FixedClock;
    use crate::error::LogErrorTracker;
    use crate::lease::MemoryLeaseStore;
    use crate::reaper::policies_from_config;
    use crate::config::settings::ReaperConfig;

    fn worker(store: Arc<InMemoryBuildStore>, leases: Arc<dyn LeaseStore>) -> StuckBuildsWorker {
        let now = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let reaper = StuckBuildsReaper::new(
            store,
            Arc::new(StaticRunnerAvailability::new(TimeDelta::hours(2))),
            Arc::new(LogErrorTracker),
            Arc::new(FixedClock::new(now)),
        );
        StuckBuildsWorker::new(
            Arc::new(reaper),
            policies_from_config(&ReaperConfig::default()),
            leases,
            Duration::from_secs(1800),
        )
    }

    #[tokio::test]
    async fn test_skips_when_lease_is_held() {
        let leases: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
        leases
            .try_obtain(EXCLUSIVE_LEASE_KEY, "other-process", Duration::from_secs(60))
            .await
            .unwrap();

        let worker = worker(Arc::new(InMemoryBuildStore::new()), leases);
        assert!(worker.perform().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_runs_every_policy_and_releases_lease() {
        let leases: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
        let worker = worker(Arc::new(InMemoryBuildStore::new()), leases.clone());

        let summaries = worker.perform().await.unwrap().unwrap();
        assert_eq!(summaries.len(), 5);
        assert_eq!(leases.holder(EXCLUSIVE_LEASE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_perform_policy_by_name() {
        let store = Arc::new(InMemoryBuildStore::new());
        let created = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        store
            .insert(Build {
                id: 1,
                name: "deploy".to_string(),
                stage_name: "deploy".to_string(),
                status: BuildStatus::Running,
                failure_reason: None,
                project_id: 1,
                pipeline_id: 1,
                runner_id: Some(4),
                tag_list: vec![],
                lock_version: 0,
                created_at: created,
                updated_at: created,
                scheduled_at: None,
                finished_at: None,
            })
            .await;
        let worker = worker(store.clone(), Arc::new(MemoryLeaseStore::new()));

        let summary = worker.perform_policy("running").await.unwrap().unwrap();
        assert_eq!(summary.dropped, 1);
        assert!(worker.perform_policy("bogus").await.is_err());
    }
}
