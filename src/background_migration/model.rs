use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use diesel::prelude::*;
use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::schema::batched_background_migrations;

/// Batched migration status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::BatchedMigrationStatus")]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    Paused,
    Active,
    Finished,
    Failed,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationStatus::Paused => write!(f, "paused"),
            MigrationStatus::Active => write!(f, "active"),
            MigrationStatus::Finished => write!(f, "finished"),
            MigrationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Inclusive id range handed to one batch job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchRange {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq, Queryable, QueryableByName, Selectable, Serialize)]
#[diesel(table_name = batched_background_migrations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BatchedMigration {
    pub id: i64,
    pub job_class_name: String,
    pub table_name: String,
    pub column_name: String,
    pub job_arguments: JsonValue,
    pub status: MigrationStatus,
    pub interval_seconds: i32,
    pub min_value: i64,
    pub max_value: i64,
    pub batch_size: i32,
    pub next_min_value: i64,
    pub failed_attempts: i32,
    pub last_run_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl BatchedMigration {
    pub fn is_active(&self) -> bool {
        self.status == MigrationStatus::Active
    }

    pub fn interval(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.interval_seconds.max(0)))
    }

    /// True when the migration never ran or its last run is at least
    /// `interval - variance` old.
    pub fn interval_elapsed(&self, now: NaiveDateTime, variance: TimeDelta) -> bool {
        match self.last_run_at {
            None => true,
            Some(last_run_at) => last_run_at <= now - (self.interval() - variance),
        }
    }

    /// Lease TTL for one execution: `interval * multiplier`, at least one second.
    pub fn lease_timeout(&self, multiplier: u32) -> Duration {
        let secs = u64::try_from(self.interval_seconds.max(0)).unwrap_or(0) * u64::from(multiplier);
        Duration::from_secs(secs.max(1))
    }

    /// Next range to process, or `None` once the cursor passed `max_value`.
    pub fn next_batch(&self) -> Option<BatchRange> {
        if self.next_min_value > self.max_value {
            return None;
        }

        let size = i64::from(self.batch_size.max(1));
        let end = self
            .next_min_value
            .saturating_add(size - 1)
            .min(self.max_value);

        Some(BatchRange {
            start: self.next_min_value,
            end,
        })
    }
}

/// Progress written after a batch attempt. `None` fields are left alone.
#[derive(Debug, Clone, PartialEq, AsChangeset)]
#[diesel(table_name = batched_background_migrations)]
pub struct BatchUpdate {
    pub status: Option<MigrationStatus>,
    pub next_min_value: Option<i64>,
    pub failed_attempts: Option<i32>,
    pub last_run_at: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

impl BatchUpdate {
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            status: None,
            next_min_value: None,
            failed_attempts: None,
            last_run_at: None,
            updated_at: now,
        }
    }

    pub fn apply(&self, migration: &mut BatchedMigration) {
        if let Some(status) = self.status {
            migration.status = status;
        }
        if let Some(next_min_value) = self.next_min_value {
            migration.next_min_value = next_min_value;
        }
        if let Some(failed_attempts) = self.failed_attempts {
            migration.failed_attempts = failed_attempts;
        }
        if let Some(last_run_at) = self.last_run_at {
            migration.last_run_at = Some(last_run_at);
        }
        migration.updated_at = self.updated_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn migration() -> BatchedMigration {
        BatchedMigration {
            id: 1,
            job_class_name: "CopyColumnUsingBackgroundMigrationJob".to_string(),
            table_name: "events".to_string(),
            column_name: "id".to_string(),
            job_arguments: serde_json::json!(["old", "new"]),
            status: MigrationStatus::Active,
            interval_seconds: 3600,
            min_value: 1,
            max_value: 250,
            batch_size: 100,
            next_min_value: 1,
            failed_attempts: 0,
            last_run_at: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_interval_elapsed() {
        let mut m = migration();
        assert!(m.interval_elapsed(now(), TimeDelta::zero()));

        m.last_run_at = Some(now() - TimeDelta::minutes(30));
        assert!(!m.interval_elapsed(now(), TimeDelta::zero()));

        m.last_run_at = Some(now() - TimeDelta::minutes(61));
        assert!(m.interval_elapsed(now(), TimeDelta::zero()));
    }

    #[test]
    fn test_variance_widens_window() {
        let mut m = migration();
        m.last_run_at = Some(now() - TimeDelta::seconds(3597));

        assert!(!m.interval_elapsed(now(), TimeDelta::zero()));
        assert!(m.interval_elapsed(now(), TimeDelta::seconds(5)));
    }

    #[test]
    fn test_next_batch_clamps_to_max_value() {
        let mut m = migration();
        assert_eq!(m.next_batch(), Some(BatchRange { start: 1, end: 100 }));

        m.next_min_value = 201;
        assert_eq!(m.next_batch(), Some(BatchRange { start: 201, end: 250 }));

        m.next_min_value = 251;
        assert_eq!(m.next_batch(), None);
    }

    #[test]
    fn test_lease_timeout() {
        let mut m = migration();
        assert_eq!(m.lease_timeout(3), Duration::from_secs(3 * 3600));

        m.interval_seconds = 0;
        assert_eq!(m.lease_timeout(3), Duration::from_secs(1));
    }

    #[test]
    fn test_batch_update_apply() {
        let mut m = migration();
        let later = now() + TimeDelta::minutes(1);
        let update = BatchUpdate {
            next_min_value: Some(101),
            last_run_at: Some(later),
            ..BatchUpdate::at(later)
        };
        update.apply(&mut m);

        assert_eq!(m.next_min_value, 101);
        assert_eq!(m.last_run_at, Some(later));
        assert_eq!(m.status, MigrationStatus::Active);
        assert_eq!(m.updated_at, later);
    }
}
