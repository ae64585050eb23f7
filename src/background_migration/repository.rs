//! Postgres migration repository using diesel_async.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Timestamp};
use diesel_async::RunQueryDsl;

use crate::background_migration::{BatchUpdate, BatchedMigration, MigrationStatus, MigrationStore};
use crate::db::AsyncDbPool;
use crate::error::{AppError, AppResult};
use crate::schema::batched_background_migrations;

const ACTIVE_DISTINCT_ON_TABLE_SQL: &str = r#"
SELECT * FROM (
    SELECT DISTINCT ON (table_name) *
    FROM batched_background_migrations
    WHERE status = 'active'
      AND (last_run_at IS NULL OR last_run_at <= $1 - make_interval(secs => interval_seconds))
    ORDER BY table_name, id
) AS candidates
ORDER BY id
LIMIT $2
"#;

#[derive(Clone)]
pub struct MigrationRepository {
    pool: AsyncDbPool,
}

impl MigrationRepository {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MigrationStore for MigrationRepository {
    async fn active_distinct_on_table(
        &self,
        now: NaiveDateTime,
        limit: i64,
    ) -> AppResult<Vec<BatchedMigration>> {
        let mut conn = self.pool.get().await?;

        diesel::sql_query(ACTIVE_DISTINCT_ON_TABLE_SQL)
            .bind::<Timestamp, _>(now)
            .bind::<BigInt, _>(limit)
            .load::<BatchedMigration>(&mut conn)
            .await
            .map_err(AppError::from)
    }

    async fn find_executable(&self, id: i64) -> AppResult<Option<BatchedMigration>> {
        let mut conn = self.pool.get().await?;

        batched_background_migrations::table
            .find(id)
            .filter(
                batched_background_migrations::status
                    .eq(MigrationStatus::Active)
                    .or(batched_background_migrations::status.eq(MigrationStatus::Paused)),
            )
            .select(BatchedMigration::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(AppError::from)
    }

    async fn record_batch(&self, id: i64, update: &BatchUpdate) -> AppResult<BatchedMigration> {
        let mut conn = self.pool.get().await?;

        diesel::update(batched_background_migrations::table.find(id))
            .set(update)
            .returning(BatchedMigration::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(AppError::from)
    }
}
