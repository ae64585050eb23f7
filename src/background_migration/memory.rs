//! In-memory migration store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeDelta};
use tokio::sync::RwLock;

use crate::background_migration::{BatchUpdate, BatchedMigration, MigrationStatus, MigrationStore};
use crate::error::{AppError, AppResult};

#[derive(Debug, Default)]
pub struct InMemoryMigrationStore {
    migrations: RwLock<BTreeMap<i64, BatchedMigration>>,
}

impl InMemoryMigrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, migration: BatchedMigration) {
        self.migrations.write().await.insert(migration.id, migration);
    }

    pub async fn get(&self, id: i64) -> Option<BatchedMigration> {
        self.migrations.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl MigrationStore for InMemoryMigrationStore {
    async fn active_distinct_on_table(
        &self,
        now: NaiveDateTime,
        limit: i64,
    ) -> AppResult<Vec<BatchedMigration>> {
        let migrations = self.migrations.read().await;
        let mut per_table: BTreeMap<&str, &BatchedMigration> = BTreeMap::new();

        // BTreeMap iteration is id order, so the first hit per table is the lowest id.
        for migration in migrations.values() {
            if migration.is_active() && migration.interval_elapsed(now, TimeDelta::zero()) {
                per_table
                    .entry(migration.table_name.as_str())
                    .or_insert(migration);
            }
        }

        let mut selected: Vec<BatchedMigration> = per_table.into_values().cloned().collect();
        selected.sort_by_key(|m| m.id);
        selected.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(selected)
    }

    async fn find_executable(&self, id: i64) -> AppResult<Option<BatchedMigration>> {
        Ok(self.get(id).await.filter(|m| {
            matches!(m.status, MigrationStatus::Active | MigrationStatus::Paused)
        }))
    }

    async fn record_batch(&self, id: i64, update: &BatchUpdate) -> AppResult<BatchedMigration> {
        let mut migrations = self.migrations.write().await;
        let migration = migrations.get_mut(&id).ok_or_else(|| AppError::NotFound {
            entity: "batched_background_migration".to_string(),
            field: "id".to_string(),
            value: id.to_string(),
        })?;

        update.apply(migration);
        Ok(migration.clone())
    }
}
