use chrono::{NaiveDateTime, TimeDelta};

use crate::ci::{BuildStatus, FailureReason, StaleCondition, StaleSelection};
use crate::config::settings::ReaperConfig;

/// Label carried in log lines; `Stuck` policies also re-check the `stuck?`
/// predicate per build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckType {
    Outdated,
    Stuck,
}

impl StuckType {
    pub fn as_str(self) -> &'static str {
        match self {
            StuckType::Outdated => "outdated",
            StuckType::Stuck => "stuck",
        }
    }
}

/// One row of the drop policy table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropPolicy {
    pub name: &'static str,
    pub status: BuildStatus,
    pub condition: StaleCondition,
    pub timeout: TimeDelta,
    pub failure_reason: FailureReason,
    pub stuck_type: StuckType,
}

impl DropPolicy {
    pub fn running(timeout: TimeDelta) -> Self {
        Self {
            name: "running",
            status: BuildStatus::Running,
            condition: StaleCondition::CreatedAndUpdatedBefore,
            timeout,
            failure_reason: FailureReason::StuckOrTimeoutFailure,
            stuck_type: StuckType::Outdated,
        }
    }

    pub fn scheduled(timeout: TimeDelta) -> Self {
        Self {
            name: "scheduled",
            status: BuildStatus::Scheduled,
            condition: StaleCondition::ScheduledBefore,
            timeout,
            failure_reason: FailureReason::StaleSchedule,
            stuck_type: StuckType::Outdated,
        }
    }

    pub fn pending_outdated(timeout: TimeDelta) -> Self {
        Self {
            name: "pending_outdated",
            status: BuildStatus::Pending,
            condition: StaleCondition::CreatedAndUpdatedBefore,
            timeout,
            failure_reason: FailureReason::StuckOrTimeoutFailure,
            stuck_type: StuckType::Outdated,
        }
    }

    pub fn pending_stuck(timeout: TimeDelta) -> Self {
        Self {
            name: "pending_stuck",
            status: BuildStatus::Pending,
            condition: StaleCondition::CreatedAndUpdatedBefore,
            timeout,
            failure_reason: FailureReason::StuckOrTimeoutFailure,
            stuck_type: StuckType::Stuck,
        }
    }

    pub fn canceling(timeout: TimeDelta) -> Self {
        Self {
            name: "canceling",
            status: BuildStatus::Canceling,
            condition: StaleCondition::CreatedAndUpdatedBefore,
            timeout,
            failure_reason: FailureReason::StuckOrTimeoutFailure,
            stuck_type: StuckType::Outdated,
        }
    }

    pub fn threshold(&self, now: NaiveDateTime) -> NaiveDateTime {
        now.checked_sub_signed(self.timeout)
            .unwrap_or(NaiveDateTime::MIN)
    }

    pub fn selection(&self, now: NaiveDateTime) -> StaleSelection {
        StaleSelection {
            status: self.status,
            condition: self.condition,
            threshold: self.threshold(now),
        }
    }

    pub fn requires_stuck_check(&self) -> bool {
        self.stuck_type == StuckType::Stuck
    }
}

/// Names of the policies in execution order.
pub const POLICY_NAMES: [&str; 5] = [
    "running",
    "scheduled",
    "pending_outdated",
    "pending_stuck",
    "canceling",
];

/// Policy table in execution order.
pub fn policies_from_config(config: &ReaperConfig) -> Vec<DropPolicy> {
    vec![
        DropPolicy::running(TimeDelta::seconds(config.running_timeout as i64)),
        DropPolicy::scheduled(TimeDelta::seconds(config.scheduled_timeout as i64)),
        DropPolicy::pending_outdated(TimeDelta::seconds(config.pending_outdated_timeout as i64)),
        DropPolicy::pending_stuck(TimeDelta::seconds(config.pending_stuck_timeout as i64)),
        DropPolicy::canceling(TimeDelta::seconds(config.canceling_timeout as i64)),
    ]
}
