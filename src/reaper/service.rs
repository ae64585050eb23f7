use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::json;

use crate::ci::{Build, BuildStatus, BuildStore, RunnerAvailability, TransitionError};
use crate::clock::Clock;
use crate::config::settings::ReaperConfig;
use crate::error::{AppResult, ErrorTracker};
use crate::reaper::{Attempt, DropPolicy, OptimisticRetry, RetryOutcome};

/// Counters for one policy invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReapSummary {
    pub policy: String,
    pub pages: u32,
    pub examined: u64,
    pub dropped: u64,
    pub doomed: u64,
    /// Left alone: finished by another writer, or a live build that ended a stuck drain.
    pub skipped: u64,
    /// Could be neither dropped nor doomed.
    pub failed: u64,
}

impl ReapSummary {
    fn new(policy: &str) -> Self {
        Self {
            policy: policy.to_string(),
            ..Default::default()
        }
    }

    pub fn transitioned(&self) -> u64 {
        self.dropped + self.doomed
    }
}

enum DropResult {
    Dropped,
    Doomed,
    /// Another writer finished or removed the build first.
    Settled,
    Failed,
}

/// Shared drop strategy used by every policy.
pub struct StuckBuildsReaper {
    builds: Arc<dyn BuildStore>,
    runners: Arc<dyn RunnerAvailability>,
    tracker: Arc<dyn ErrorTracker>,
    clock: Arc<dyn Clock>,
    batch_size: i64,
    retry: OptimisticRetry,
}

impl StuckBuildsReaper {
    pub fn new(
        builds: Arc<dyn BuildStore>,
        runners: Arc<dyn RunnerAvailability>,
        tracker: Arc<dyn ErrorTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            builds,
            runners,
            tracker,
            clock,
            batch_size: 100,
            retry: OptimisticRetry::default(),
        }
    }

    pub fn with_config(mut self, config: &ReaperConfig) -> Self {
        self.batch_size = config.batch_size;
        self.retry = OptimisticRetry::new(
            config.max_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
            config.retry_backoff_multiplier,
        );
        self
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: OptimisticRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Drain every build matching `policy`, one page at a time.
    ///
    /// Per-build failures are isolated: they are doomed and reported, never
    /// returned. Only a failing page fetch is propagated.
    pub async fn execute(&self, policy: &DropPolicy) -> AppResult<ReapSummary> {
        let now = self.clock.now();
        let selection = policy.selection(now);
        let mut summary = ReapSummary::new(policy.name);

        tracing::debug!(
            policy = policy.name,
            threshold = %selection.threshold,
            batch_size = self.batch_size,
            "Reaper pass started"
        );

        loop {
            let page = self.builds.find_stale(&selection, self.batch_size).await?;
            if page.is_empty() {
                break;
            }
            summary.pages += 1;

            let mut progressed = false;
            let mut reached_live_build = false;

            for build in page {
                summary.examined += 1;

                // Pages come in creation order; the first build a runner can
                // still pick ends the drain.
                if policy.requires_stuck_check() && !self.is_stuck(&build, now).await {
                    tracing::debug!(
                        policy = policy.name,
                        build_id = build.id,
                        "Build has an online runner, stopping"
                    );
                    summary.skipped += 1;
                    reached_live_build = true;
                    break;
                }

                match self.drop_build(policy, &build).await {
                    DropResult::Dropped => {
                        summary.dropped += 1;
                        progressed = true;
                    }
                    DropResult::Doomed => {
                        summary.doomed += 1;
                        progressed = true;
                    }
                    DropResult::Settled => {
                        summary.skipped += 1;
                        progressed = true;
                    }
                    DropResult::Failed => summary.failed += 1,
                }
            }

            if reached_live_build {
                break;
            }
            if !progressed {
                tracing::warn!(
                    policy = policy.name,
                    "Reaper page changed no builds, stopping"
                );
                break;
            }
        }

        tracing::info!(
            policy = %summary.policy,
            pages = summary.pages,
            examined = summary.examined,
            dropped = summary.dropped,
            doomed = summary.doomed,
            skipped = summary.skipped,
            failed = summary.failed,
            "Reaper pass finished"
        );

        Ok(summary)
    }

    async fn is_stuck(&self, build: &Build, now: NaiveDateTime) -> bool {
        match self.runners.any_online_for(build, now).await {
            Ok(online) => !online,
            Err(e) => {
                tracing::warn!(build_id = build.id, error = %e, "Runner check failed");
                false
            }
        }
    }

    async fn drop_build(&self, policy: &DropPolicy, build: &Build) -> DropResult {
        tracing::info!(
            policy = policy.name,
            stuck_type = policy.stuck_type.as_str(),
            build_id = build.id,
            project_id = build.project_id,
            runner_id = ?build.runner_id,
            build_status = %build.status,
            failure_reason = %policy.failure_reason,
            "Dropping {} build",
            policy.stuck_type.as_str()
        );

        let builds = &self.builds;
        let clock = &self.clock;
        let reason = policy.failure_reason;

        let outcome = self
            .retry
            .run(move |attempt| async move {
                let current = if attempt == 1 {
                    build.clone()
                } else {
                    match builds.reload(build.id).await {
                        Ok(Some(fresh)) => fresh,
                        Ok(None) => return Attempt::Fatal(TransitionError::NotFound(build.id)),
                        Err(e) => return Attempt::Fatal(TransitionError::Store(e)),
                    }
                };

                match builds.drop_build(&current, reason, clock.now()).await {
                    Ok(dropped) => Attempt::Done(dropped),
                    Err(e) if e.is_conflict() => Attempt::Conflict(e),
                    Err(e) => Attempt::Fatal(e),
                }
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { value, attempts } => {
                if value.status == BuildStatus::Failed && value.failure_reason == Some(reason) {
                    tracing::debug!(build_id = build.id, attempts, "Build dropped");
                    DropResult::Dropped
                } else {
                    tracing::debug!(
                        build_id = build.id,
                        build_status = %value.status,
                        "Build already finished"
                    );
                    DropResult::Settled
                }
            }
            RetryOutcome::Failed {
                error: TransitionError::NotFound(id),
                ..
            } => {
                tracing::debug!(build_id = id, "Build disappeared before drop");
                DropResult::Settled
            }
            RetryOutcome::Exhausted { attempts, error } | RetryOutcome::Failed { attempts, error } => {
                self.doom(policy, build, &error, attempts).await
            }
        }
    }

    async fn doom(
        &self,
        policy: &DropPolicy,
        build: &Build,
        error: &TransitionError,
        attempts: u32,
    ) -> DropResult {
        let context = json!({
            "build_id": build.id,
            "build_name": build.name,
            "build_stage": build.stage_name,
            "project_id": build.project_id,
            "pipeline_id": build.pipeline_id,
            "runner_id": build.runner_id,
            "build_status": build.status,
            "policy": policy.name,
            "failure_reason": policy.failure_reason,
            "attempts": attempts,
        });
        self.tracker.track_exception(error, context.clone());

        match self.builds.doom(build, self.clock.now()).await {
            Ok(_) => {
                tracing::warn!(
                    policy = policy.name,
                    build_id = build.id,
                    attempts,
                    error = %error,
                    "Build could not be dropped and was doomed"
                );
                DropResult::Doomed
            }
            Err(TransitionError::NotFound(_)) => DropResult::Settled,
            Err(doom_error) => {
                tracing::error!(build_id = build.id, error = %doom_error, "Failed to doom build");
                self.tracker.track_exception(&doom_error, context);
                DropResult::Failed
            }
        }
    }
}
