//! Per-migration execution unit guarded by a lease keyed on the table.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::TimeDelta;
use serde::Serialize;

use crate::background_migration::{BatchOutcome, BatchedMigrationRunner, MigrationStore};
use crate::clock::Clock;
use crate::error::AppResult;
use crate::lease::{LeaseStore, try_obtain_lease};

const LEASE_KEY_PREFIX: &str = "database:batched_background_migration:execution_worker";

/// Runtime switch for batched migrations, read by both the scheduler and
/// the execution worker.
#[derive(Debug, Clone)]
pub struct MigrationFeature(Arc<AtomicBool>);

impl MigrationFeature {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }
}

/// A database holding a `batched_background_migrations` table.
#[derive(Clone)]
pub struct TrackingDatabase {
    pub name: String,
    /// Set when this database is configured as an alias of another one; its
    /// migrations then run through that database instead.
    pub shares_config_with: Option<String>,
    pub store: Arc<dyn MigrationStore>,
}

impl TrackingDatabase {
    pub fn new(name: impl Into<String>, store: Arc<dyn MigrationStore>) -> Self {
        Self {
            name: name.into(),
            shares_config_with: None,
            store,
        }
    }

    pub fn sharing_config_with(mut self, other: impl Into<String>) -> Self {
        self.shares_config_with = Some(other.into());
        self
    }

    pub fn shares_config(&self) -> bool {
        self.shares_config_with.is_some()
    }
}

#[derive(Clone, Default)]
pub struct MigrationDatabases {
    databases: BTreeMap<String, TrackingDatabase>,
}

impl MigrationDatabases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, database: TrackingDatabase) {
        self.databases.insert(database.name.clone(), database);
    }

    pub fn get(&self, name: &str) -> Option<&TrackingDatabase> {
        self.databases.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackingDatabase> {
        self.databases.values()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Disabled,
    SharedConfig,
    UnknownDatabase,
    /// Missing, paused, finished or failed by the time the unit ran.
    NotExecutable,
    LeaseHeld,
    IntervalNotElapsed,
    Ran(BatchOutcome),
}

pub fn lease_key(database_name: &str, table_name: &str) -> String {
    format!(
        "{}:database_name:{}:table_name:{}",
        LEASE_KEY_PREFIX, database_name, table_name
    )
}

pub struct ExecutionWorker {
    databases: Arc<MigrationDatabases>,
    runner: Arc<BatchedMigrationRunner>,
    leases: Arc<dyn LeaseStore>,
    clock: Arc<dyn Clock>,
    feature: MigrationFeature,
    lease_timeout_multiplier: u32,
    interval_variance: TimeDelta,
}

impl ExecutionWorker {
    pub fn new(
        databases: Arc<MigrationDatabases>,
        runner: Arc<BatchedMigrationRunner>,
        leases: Arc<dyn LeaseStore>,
        clock: Arc<dyn Clock>,
        feature: MigrationFeature,
    ) -> Self {
        Self {
            databases,
            runner,
            leases,
            clock,
            feature,
            lease_timeout_multiplier: 3,
            interval_variance: TimeDelta::seconds(5),
        }
    }

    pub fn with_lease_timeout_multiplier(mut self, multiplier: u32) -> Self {
        self.lease_timeout_multiplier = multiplier.max(1);
        self
    }

    pub fn with_interval_variance(mut self, variance: TimeDelta) -> Self {
        self.interval_variance = variance;
        self
    }

    /// Execute one batch of migration `migration_id` on `database_name`.
    ///
    /// Every "not now" answer is an outcome, not an error. The table lease is
    /// released when the attempt ends; its `interval * multiplier` TTL only
    /// matters if this process dies mid-batch.
    pub async fn perform(&self, database_name: &str, migration_id: i64) -> AppResult<ExecutionOutcome> {
        if !self.feature.is_enabled() {
            return Ok(ExecutionOutcome::Disabled);
        }

        let Some(database) = self.databases.get(database_name) else {
            tracing::warn!(database_name, migration_id, "Unknown tracking database");
            return Ok(ExecutionOutcome::UnknownDatabase);
        };
        if database.shares_config() {
            return Ok(ExecutionOutcome::SharedConfig);
        }

        let migration = match database.store.find_executable(migration_id).await? {
            Some(m) if m.is_active() => m,
            _ => return Ok(ExecutionOutcome::NotExecutable),
        };

        let key = lease_key(&database.name, &migration.table_name);
        let timeout = migration.lease_timeout(self.lease_timeout_multiplier);

        let outcome = try_obtain_lease(
            self.leases.clone(),
            &key,
            timeout,
            self.run_leased(database, migration_id),
        )
        .await?;

        match outcome {
            Some(result) => result,
            None => {
                tracing::debug!(database_name, migration_id, lease_key = %key, "Migration already running");
                Ok(ExecutionOutcome::LeaseHeld)
            }
        }
    }

    async fn run_leased(
        &self,
        database: &TrackingDatabase,
        migration_id: i64,
    ) -> AppResult<ExecutionOutcome> {
        let Some(migration) = database.store.find_executable(migration_id).await? else {
            return Ok(ExecutionOutcome::NotExecutable);
        };
        if !migration.is_active() {
            return Ok(ExecutionOutcome::NotExecutable);
        }
        if !migration.interval_elapsed(self.clock.now(), self.interval_variance) {
            tracing::debug!(
                database_name = %database.name,
                migration_id,
                "Migration interval not elapsed"
            );
            return Ok(ExecutionOutcome::IntervalNotElapsed);
        }

        let batch = self
            .runner
            .run_migration_job(database.store.as_ref(), &migration)
            .await?;
        Ok(ExecutionOutcome::Ran(batch))
    }
}
