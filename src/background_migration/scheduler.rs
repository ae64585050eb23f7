use std::sync::Arc;

use async_trait::async_trait;

use crate::background_migration::{Dispatcher, ExecutionRequest, MigrationFeature, TrackingDatabase};
use crate::clock::Clock;
use crate::error::AppResult;
use crate::jobs::{JobContext, JobTask};

/// Cron entry point for one tracking database: picks overdue migrations and
/// enqueues an execution unit for each, without waiting for them.
pub struct BatchedMigrationScheduler {
    database: TrackingDatabase,
    feature: MigrationFeature,
    dispatcher: Arc<dyn Dispatcher>,
    clock: Arc<dyn Clock>,
    max_running_migrations: i64,
}

impl BatchedMigrationScheduler {
    pub fn new(
        database: TrackingDatabase,
        feature: MigrationFeature,
        dispatcher: Arc<dyn Dispatcher>,
        clock: Arc<dyn Clock>,
        max_running_migrations: i64,
    ) -> Self {
        Self {
            database,
            feature,
            dispatcher,
            clock,
            max_running_migrations,
        }
    }

    pub fn database_name(&self) -> &str {
        &self.database.name
    }

    /// Returns how many executions were enqueued.
    pub async fn perform(&self) -> AppResult<usize> {
        if !self.feature.is_enabled() {
            tracing::debug!(database_name = %self.database.name, "Batched migrations disabled");
            return Ok(0);
        }
        if let Some(other) = &self.database.shares_config_with {
            tracing::debug!(
                database_name = %self.database.name,
                shares_config_with = %other,
                "Tracking database shares config, skipping"
            );
            return Ok(0);
        }

        let migrations = self
            .database
            .store
            .active_distinct_on_table(self.clock.now(), self.max_running_migrations)
            .await?;
        if migrations.is_empty() {
            return Ok(0);
        }

        let mut dispatched = 0;
        for migration in &migrations {
            let request = ExecutionRequest {
                database_name: self.database.name.clone(),
                migration_id: migration.id,
            };
            match self.dispatcher.enqueue(request).await {
                Ok(()) => dispatched += 1,
                Err(e) => tracing::error!(
                    database_name = %self.database.name,
                    migration_id = migration.id,
                    error = %e,
                    "Failed to enqueue migration execution"
                ),
            }
        }

        tracing::info!(
            database_name = %self.database.name,
            selected = migrations.len(),
            dispatched,
            "Batched migrations scheduled"
        );
        Ok(dispatched)
    }
}

#[async_trait]
impl JobTask for BatchedMigrationScheduler {
    fn task_type(&self) -> &'static str {
        "batched_migrations"
    }

    async fn execute(&self, ctx: JobContext) -> AppResult<()> {
        if ctx.cancellation_token.is_cancelled() {
            return Ok(());
        }
        self.perform().await.map(|_| ())
    }

    fn description(&self) -> Option<String> {
        Some(format!(
            "Dispatch overdue batched background migrations on {}",
            self.database.name
        ))
    }
}
