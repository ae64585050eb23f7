//! Reap command handler
//!
//! One stuck builds pass under the same lease the cron entry uses.

use crate::error::AppResult;
use crate::reaper::ReapSummary;
use crate::state::AppState;

pub struct ReapCommandHandler {
    state: AppState,
}

impl ReapCommandHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// `None` when another process holds the worker lease.
    pub async fn run(&self, policy: Option<&str>) -> AppResult<Option<Vec<ReapSummary>>> {
        let worker = &self.state.stuck_builds;
        match policy {
            Some(name) => Ok(worker.perform_policy(name).await?.map(|s| vec![s])),
            None => worker.perform().await,
        }
    }

    pub async fn execute(&self, policy: Option<&str>) -> AppResult<()> {
        let Some(summaries) = self.run(policy).await? else {
            println!("Another reaper holds the worker lease, nothing done");
            return Ok(());
        };

        for summary in &summaries {
            println!(
                "{:<18} examined={} dropped={} doomed={} skipped={} failed={}",
                summary.policy,
                summary.examined,
                summary.dropped,
                summary.doomed,
                summary.skipped,
                summary.failed
            );
        }
        let transitioned: u64 = summaries.iter().map(ReapSummary::transitioned).sum();
        println!("✓ {} build(s) transitioned", transitioned);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::background_migration::MigrationJobRegistry;
    use crate::clock::SystemClock;
    use crate::config::Settings;
    use crate::error::LogErrorTracker;
    use crate::reaper::POLICY_NAMES;
    use crate::state::InMemoryBackends;

    fn handler() -> ReapCommandHandler {
        let settings = Settings::default();
        let backends = InMemoryBackends::new(&settings).backends(MigrationJobRegistry::new());
        let state = AppState::assemble(
            settings,
            backends,
            Arc::new(SystemClock),
            Arc::new(LogErrorTracker),
        )
        .unwrap();
        ReapCommandHandler::new(state)
    }

    #[tokio::test]
    async fn test_run_all_policies_on_empty_store() {
        let summaries = handler().run(None).await.unwrap().unwrap();
        let names: Vec<&str> = summaries.iter().map(|s| s.policy.as_str()).collect();
        assert_eq!(names, POLICY_NAMES);
        assert!(summaries.iter().all(|s| s.examined == 0));
    }

    #[tokio::test]
    async fn test_run_single_policy() {
        let summaries = handler().run(Some("canceling")).await.unwrap().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].policy, "canceling");
    }

    #[tokio::test]
    async fn test_unknown_policy_is_rejected() {
        let result = handler().run(Some("stale")).await;
        assert!(matches!(result, Err(crate::error::AppError::Validation { .. })));
    }
}
