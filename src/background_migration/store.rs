use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::background_migration::{BatchUpdate, BatchedMigration};
use crate::error::AppResult;

/// Access to one tracking database's `batched_background_migrations` table.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Active migrations whose interval has elapsed at `now`, at most one per
    /// table (lowest id wins), ordered by id and capped at `limit`.
    async fn active_distinct_on_table(
        &self,
        now: NaiveDateTime,
        limit: i64,
    ) -> AppResult<Vec<BatchedMigration>>;

    /// Fresh read of a migration that can still run (active or paused).
    async fn find_executable(&self, id: i64) -> AppResult<Option<BatchedMigration>>;

    async fn record_batch(&self, id: i64, update: &BatchUpdate) -> AppResult<BatchedMigration>;
}
