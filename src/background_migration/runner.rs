//! Runs one batch of a batched background migration and records progress.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use crate::background_migration::{
    BatchRange, BatchUpdate, BatchedMigration, MigrationStatus, MigrationStore,
};
use crate::clock::Clock;
use crate::error::{AppError, AppResult, ErrorTracker};

/// A batch job class. Runs may be repeated when a lease expires mid-run, so
/// `perform` must be idempotent for any given range.
#[async_trait]
pub trait MigrationJob: Send + Sync {
    fn job_class_name(&self) -> &'static str;

    async fn perform(&self, migration: &BatchedMigration, batch: BatchRange) -> anyhow::Result<()>;
}

/// Explicit table of batch job classes keyed by `job_class_name`.
#[derive(Default)]
pub struct MigrationJobRegistry {
    jobs: HashMap<String, Arc<dyn MigrationJob>>,
}

impl MigrationJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job: Arc<dyn MigrationJob>) -> AppResult<()> {
        let name = job.job_class_name();
        if self.jobs.contains_key(name) {
            return Err(AppError::Validation {
                field: "job_class_name".to_string(),
                reason: format!("batch job class '{}' is already registered", name),
            });
        }

        self.jobs.insert(name.to_string(), job);
        Ok(())
    }

    pub fn get(&self, job_class_name: &str) -> Option<Arc<dyn MigrationJob>> {
        self.jobs.get(job_class_name).cloned()
    }

    pub fn job_class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.jobs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BatchOutcome {
    Succeeded { batch: BatchRange, finished: bool },
    Failed { batch: BatchRange, attempts: i32, gave_up: bool },
    /// Nothing left to process; the migration was marked finished.
    Finished,
    UnknownJobClass { job_class_name: String },
}

pub struct BatchedMigrationRunner {
    jobs: Arc<MigrationJobRegistry>,
    tracker: Arc<dyn ErrorTracker>,
    clock: Arc<dyn Clock>,
    max_batch_attempts: i32,
}

impl BatchedMigrationRunner {
    pub fn new(
        jobs: Arc<MigrationJobRegistry>,
        tracker: Arc<dyn ErrorTracker>,
        clock: Arc<dyn Clock>,
        max_batch_attempts: i32,
    ) -> Self {
        Self {
            jobs,
            tracker,
            clock,
            max_batch_attempts: max_batch_attempts.max(1),
        }
    }

    pub async fn run_migration_job(
        &self,
        store: &dyn MigrationStore,
        migration: &BatchedMigration,
    ) -> AppResult<BatchOutcome> {
        let now = self.clock.now();

        let Some(job) = self.jobs.get(&migration.job_class_name) else {
            tracing::error!(
                migration_id = migration.id,
                job_class_name = %migration.job_class_name,
                "Unknown batch job class, marking migration failed"
            );
            let update = BatchUpdate {
                status: Some(MigrationStatus::Failed),
                last_run_at: Some(now),
                ..BatchUpdate::at(now)
            };
            store.record_batch(migration.id, &update).await?;
            return Ok(BatchOutcome::UnknownJobClass {
                job_class_name: migration.job_class_name.clone(),
            });
        };

        let Some(batch) = migration.next_batch() else {
            let update = BatchUpdate {
                status: Some(MigrationStatus::Finished),
                ..BatchUpdate::at(now)
            };
            store.record_batch(migration.id, &update).await?;
            tracing::info!(migration_id = migration.id, "Batched migration finished");
            return Ok(BatchOutcome::Finished);
        };

        tracing::info!(
            migration_id = migration.id,
            job_class_name = %migration.job_class_name,
            table_name = %migration.table_name,
            batch_start = batch.start,
            batch_end = batch.end,
            "Running migration batch"
        );

        match job.perform(migration, batch).await {
            Ok(()) => {
                let next_min_value = batch.end.saturating_add(1);
                let finished = next_min_value > migration.max_value;
                let update = BatchUpdate {
                    status: finished.then_some(MigrationStatus::Finished),
                    next_min_value: Some(next_min_value),
                    failed_attempts: Some(0),
                    last_run_at: Some(now),
                    updated_at: now,
                };
                store.record_batch(migration.id, &update).await?;

                if finished {
                    tracing::info!(migration_id = migration.id, "Batched migration finished");
                }
                Ok(BatchOutcome::Succeeded { batch, finished })
            }
            Err(e) => {
                let attempts = migration.failed_attempts.saturating_add(1);
                let gave_up = attempts >= self.max_batch_attempts;
                let update = BatchUpdate {
                    status: gave_up.then_some(MigrationStatus::Failed),
                    failed_attempts: Some(attempts),
                    last_run_at: Some(now),
                    ..BatchUpdate::at(now)
                };
                store.record_batch(migration.id, &update).await?;

                tracing::warn!(
                    migration_id = migration.id,
                    batch_start = batch.start,
                    batch_end = batch.end,
                    attempts,
                    gave_up,
                    error = %e,
                    "Migration batch failed"
                );
                self.tracker.track_exception(
                    e.as_ref(),
                    json!({
                        "migration_id": migration.id,
                        "job_class_name": migration.job_class_name,
                        "table_name": migration.table_name,
                        "batch_start": batch.start,
                        "batch_end": batch.end,
                        "attempts": attempts,
                    }),
                );

                Ok(BatchOutcome::Failed {
                    batch,
                    attempts,
                    gave_up,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::{NaiveDate, NaiveDateTime};

    use crate::background_migration::InMemoryMigrationStore;
    use crate::clock::FixedClock;
    use crate::error::LogErrorTracker;

    struct FlakyJob {
        fail: AtomicBool,
    }

    #[async_trait]
    impl MigrationJob for FlakyJob {
        fn job_class_name(&self) -> &'static str {
            "FlakyJob"
        }

        async fn perform(&self, _: &BatchedMigration, _: BatchRange) -> anyhow::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("deadlock detected");
            }
            Ok(())
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn migration(job_class_name: &str) -> BatchedMigration {
        BatchedMigration {
            id: 1,
            job_class_name: job_class_name.to_string(),
            table_name: "events".to_string(),
            column_name: "id".to_string(),
            job_arguments: serde_json::json!([]),
            status: MigrationStatus::Active,
            interval_seconds: 120,
            min_value: 1,
            max_value: 150,
            batch_size: 100,
            next_min_value: 1,
            failed_attempts: 0,
            last_run_at: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn runner(fail: bool) -> BatchedMigrationRunner {
        let mut jobs = MigrationJobRegistry::new();
        jobs.register(Arc::new(FlakyJob {
            fail: AtomicBool::new(fail),
        }))
        .unwrap();
        BatchedMigrationRunner::new(
            Arc::new(jobs),
            Arc::new(LogErrorTracker),
            Arc::new(FixedClock::new(now())),
            3,
        )
    }

    #[tokio::test]
    async fn test_batches_advance_until_finished() {
        let store = InMemoryMigrationStore::new();
        store.insert(migration("FlakyJob")).await;
        let runner = runner(false);

        let first = runner
            .run_migration_job(&store, &store.get(1).await.unwrap())
            .await
            .unwrap();
        assert_eq!(
            first,
            BatchOutcome::Succeeded {
                batch: BatchRange { start: 1, end: 100 },
                finished: false
            }
        );

        let second = runner
            .run_migration_job(&store, &store.get(1).await.unwrap())
            .await
            .unwrap();
        assert_eq!(
            second,
            BatchOutcome::Succeeded {
                batch: BatchRange { start: 101, end: 150 },
                finished: true
            }
        );

        let stored = store.get(1).await.unwrap();
        assert_eq!(stored.status, MigrationStatus::Finished);
        assert_eq!(stored.last_run_at, Some(now()));
    }

    #[tokio::test]
    async fn test_failed_batches_mark_migration_failed() {
        let store = InMemoryMigrationStore::new();
        store.insert(migration("FlakyJob")).await;
        let runner = runner(true);

        for expected_attempts in 1..=3 {
            let outcome = runner
                .run_migration_job(&store, &store.get(1).await.unwrap())
                .await
                .unwrap();
            assert!(matches!(
                outcome,
                BatchOutcome::Failed { attempts, gave_up, .. }
                    if attempts == expected_attempts && gave_up == (expected_attempts == 3)
            ));
        }

        let stored = store.get(1).await.unwrap();
        assert_eq!(stored.status, MigrationStatus::Failed);
        assert_eq!(stored.next_min_value, 1);
    }

    #[tokio::test]
    async fn test_unknown_job_class_fails_migration() {
        let store = InMemoryMigrationStore::new();
        store.insert(migration("MissingJob")).await;

        let outcome = runner(false)
            .run_migration_job(&store, &store.get(1).await.unwrap())
            .await
            .unwrap();

        assert!(matches!(outcome, BatchOutcome::UnknownJobClass { .. }));
        assert_eq!(store.get(1).await.unwrap().status, MigrationStatus::Failed);
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut jobs = MigrationJobRegistry::new();
        let job = Arc::new(FlakyJob {
            fail: AtomicBool::new(false),
        });
        jobs.register(job.clone()).unwrap();
        assert!(jobs.register(job).is_err());
        assert_eq!(jobs.job_class_names(), vec!["FlakyJob"]);
    }
}
