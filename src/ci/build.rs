use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};

use crate::schema::ci_builds;

/// Build status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::BuildStatus")]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Created,
    WaitingForResource,
    Preparing,
    Pending,
    Running,
    Success,
    Failed,
    Canceling,
    Canceled,
    Skipped,
    Manual,
    Scheduled,
}

impl BuildStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BuildStatus::Success | BuildStatus::Failed | BuildStatus::Canceled | BuildStatus::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Created => "created",
            BuildStatus::WaitingForResource => "waiting_for_resource",
            BuildStatus::Preparing => "preparing",
            BuildStatus::Pending => "pending",
            BuildStatus::Running => "running",
            BuildStatus::Success => "success",
            BuildStatus::Failed => "failed",
            BuildStatus::Canceling => "canceling",
            BuildStatus::Canceled => "canceled",
            BuildStatus::Skipped => "skipped",
            BuildStatus::Manual => "manual",
            BuildStatus::Scheduled => "scheduled",
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason recorded on a build that ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::BuildFailureReason")]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    UnknownFailure,
    ScriptFailure,
    StuckOrTimeoutFailure,
    StaleSchedule,
    RunnerSystemFailure,
    DataIntegrityFailure,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::UnknownFailure => "unknown_failure",
            FailureReason::ScriptFailure => "script_failure",
            FailureReason::StuckOrTimeoutFailure => "stuck_or_timeout_failure",
            FailureReason::StaleSchedule => "stale_schedule",
            FailureReason::RunnerSystemFailure => "runner_system_failure",
            FailureReason::DataIntegrityFailure => "data_integrity_failure",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A CI build row, including the tag list and runner id so a reaper page
/// needs no follow-up association queries.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = ci_builds)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Build {
    pub id: i64,
    pub name: String,
    pub stage_name: String,
    pub status: BuildStatus,
    pub failure_reason: Option<FailureReason>,
    pub project_id: i64,
    pub pipeline_id: i64,
    pub runner_id: Option<i64>,
    pub tag_list: Vec<String>,
    pub lock_version: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub scheduled_at: Option<NaiveDateTime>,
    pub finished_at: Option<NaiveDateTime>,
}

impl Build {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply the `failed` transition in place. Used by stores that keep rows
    /// in memory; the Postgres store does the same in one UPDATE.
    pub(crate) fn mark_failed(&mut self, reason: FailureReason, now: NaiveDateTime) {
        self.status = BuildStatus::Failed;
        self.failure_reason = Some(reason);
        self.finished_at = Some(now);
        self.updated_at = now;
        self.lock_version += 1;
    }
}
