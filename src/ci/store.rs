//! Build store and runner availability seams.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

use crate::ci::{Build, BuildStatus, FailureReason};
use crate::error::{AppError, AppResult};

/// Which timestamp(s) must be older than the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleCondition {
    /// `created_at < t AND updated_at < t`
    CreatedAndUpdatedBefore,
    /// `scheduled_at < t`
    ScheduledBefore,
}

/// One stale-build query: builds in `status` whose timestamps satisfy
/// `condition` against `threshold`. Results are ordered by
/// `(created_at, project_id, id)` ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleSelection {
    pub status: BuildStatus,
    pub condition: StaleCondition,
    pub threshold: NaiveDateTime,
}

impl StaleSelection {
    pub fn matches(&self, build: &Build) -> bool {
        if build.status != self.status {
            return false;
        }

        match self.condition {
            StaleCondition::CreatedAndUpdatedBefore => {
                build.created_at < self.threshold && build.updated_at < self.threshold
            }
            StaleCondition::ScheduledBefore => build
                .scheduled_at
                .is_some_and(|scheduled_at| scheduled_at < self.threshold),
        }
    }
}

#[derive(Error, Debug)]
pub enum TransitionError {
    /// The row's lock version moved since the build was read.
    #[error("Build {build_id} was modified concurrently (lock_version {expected} is stale)")]
    Conflict { build_id: i64, expected: i32 },

    #[error("Build {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl TransitionError {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            TransitionError::Conflict { .. } | TransitionError::Store(AppError::Conflict { .. })
        )
    }
}

/// Storage operations the reaper needs on builds.
#[async_trait]
pub trait BuildStore: Send + Sync {
    /// One page of builds matching `selection`, at most `limit` rows.
    async fn find_stale(&self, selection: &StaleSelection, limit: i64) -> AppResult<Vec<Build>>;

    async fn reload(&self, id: i64) -> AppResult<Option<Build>>;

    /// Move the build to `failed` with `reason`, guarded by `lock_version`.
    ///
    /// Already-terminal builds are returned unchanged. A stale lock version
    /// yields `TransitionError::Conflict`.
    async fn drop_build(
        &self,
        build: &Build,
        reason: FailureReason,
        now: NaiveDateTime,
    ) -> Result<Build, TransitionError>;

    /// Force `failed` with `data_integrity_failure`, with no lock version check.
    async fn doom(&self, build: &Build, now: NaiveDateTime) -> Result<Build, TransitionError>;
}

/// Live runner state behind the `stuck?` predicate.
#[async_trait]
pub trait RunnerAvailability: Send + Sync {
    /// Whether any online runner could pick `build` right now.
    async fn any_online_for(&self, build: &Build, now: NaiveDateTime) -> AppResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn build(status: BuildStatus, created_at: NaiveDateTime, updated_at: NaiveDateTime) -> Build {
        Build {
            id: 1,
            name: "rspec".to_string(),
            stage_name: "test".to_string(),
            status,
            failure_reason: None,
            project_id: 10,
            pipeline_id: 100,
            runner_id: None,
            tag_list: vec![],
            lock_version: 0,
            created_at,
            updated_at,
            scheduled_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn test_created_and_updated_both_required() {
        let selection = StaleSelection {
            status: BuildStatus::Canceling,
            condition: StaleCondition::CreatedAndUpdatedBefore,
            threshold: at(11),
        };

        assert!(selection.matches(&build(BuildStatus::Canceling, at(9), at(10))));
        assert!(!selection.matches(&build(
            BuildStatus::Canceling,
            at(9),
            at(12) - TimeDelta::minutes(5)
        )));
        assert!(!selection.matches(&build(BuildStatus::Running, at(9), at(10))));
    }

    #[test]
    fn test_scheduled_before_ignores_missing_schedule() {
        let selection = StaleSelection {
            status: BuildStatus::Scheduled,
            condition: StaleCondition::ScheduledBefore,
            threshold: at(11),
        };

        let mut scheduled = build(BuildStatus::Scheduled, at(1), at(1));
        assert!(!selection.matches(&scheduled));

        scheduled.scheduled_at = Some(at(10));
        assert!(selection.matches(&scheduled));

        scheduled.scheduled_at = Some(at(11));
        assert!(!selection.matches(&scheduled));
    }

    #[test]
    fn test_serialization_failure_counts_as_conflict() {
        let error = TransitionError::Store(AppError::Conflict {
            message: "could not serialize access".to_string(),
        });
        assert!(error.is_conflict());
        assert!(!TransitionError::NotFound(1).is_conflict());
    }
}
