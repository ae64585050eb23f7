//! Application state shared by the cron runner and the CLI commands.
//!
//! Holds the wired maintenance components. `connect` builds them against
//! PostgreSQL and the configured lease backend; `assemble` takes ready-made
//! backends so in-memory stores can be plugged in.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;

use crate::background_migration::{
    BatchedMigrationRunner, BatchedMigrationScheduler, CopyColumnJob, Dispatcher,
    ExecutionWorker, InMemoryMigrationStore, MigrationDatabases, MigrationFeature,
    MigrationJobRegistry, MigrationRepository, MigrationStore, TrackingDatabase,
};
use crate::ci::{
    BuildRepository, BuildStore, InMemoryBuildStore, RunnerAvailability, RunnerRepository,
    StaticRunnerAvailability,
};
use crate::clock::{Clock, SystemClock};
use crate::config::{DatabaseConfig, Settings};
use crate::db::{AsyncDbPool, establish_async_connection_pool};
use crate::error::{AppError, AppResult, ErrorTracker, LogErrorTracker};
use crate::jobs::{CronEntry, JobRegistry};
use crate::lease::{LeaseManager, LeaseStore, MemoryLeaseStore};
use crate::reaper::{StuckBuildsReaper, StuckBuildsWorker, policies_from_config};

/// Storage backends the maintenance components run against.
pub struct Backends {
    pub builds: Arc<dyn BuildStore>,
    pub runners: Arc<dyn RunnerAvailability>,
    /// One store per tracking database that owns its connection.
    pub migration_stores: BTreeMap<String, Arc<dyn MigrationStore>>,
    pub migration_jobs: MigrationJobRegistry,
    pub leases: Arc<dyn LeaseStore>,
}

/// Concrete in-memory stores, kept so callers can seed and inspect them.
#[derive(Clone)]
pub struct InMemoryBackends {
    pub builds: Arc<InMemoryBuildStore>,
    pub runners: Arc<StaticRunnerAvailability>,
    pub migrations: BTreeMap<String, Arc<InMemoryMigrationStore>>,
    pub leases: Arc<MemoryLeaseStore>,
}

impl InMemoryBackends {
    /// One migration store per tracking database that owns its connection.
    pub fn new(settings: &Settings) -> Self {
        let migrations = settings
            .background_migrations
            .databases
            .iter()
            .filter(|db| db.shares_config_with.is_none())
            .map(|db| (db.name.clone(), Arc::new(InMemoryMigrationStore::new())))
            .collect();

        Self {
            builds: Arc::new(InMemoryBuildStore::new()),
            runners: Arc::new(StaticRunnerAvailability::new(TimeDelta::seconds(
                settings.reaper.runner_online_timeout as i64,
            ))),
            migrations,
            leases: Arc::new(MemoryLeaseStore::new()),
        }
    }

    pub fn backends(&self, migration_jobs: MigrationJobRegistry) -> Backends {
        Backends {
            builds: self.builds.clone(),
            runners: self.runners.clone(),
            migration_stores: self
                .migrations
                .iter()
                .map(|(name, store)| (name.clone(), store.clone() as Arc<dyn MigrationStore>))
                .collect(),
            migration_jobs,
            leases: self.leases.clone(),
        }
    }
}

/// Application state containing all shared maintenance components.
///
/// Cloning is cheap since every component sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub leases: Arc<dyn LeaseStore>,
    pub clock: Arc<dyn Clock>,
    pub stuck_builds: Arc<StuckBuildsWorker>,
    pub migration_feature: MigrationFeature,
    pub migration_databases: Arc<MigrationDatabases>,
    pub execution_worker: Arc<ExecutionWorker>,
}

impl AppState {
    /// Connect to PostgreSQL and the lease backend and wire every component.
    pub async fn connect(settings: Settings) -> AppResult<Self> {
        let pool = establish_async_connection_pool(&settings.database).await?;
        let leases = LeaseManager::new(settings.lease.clone()).await?;

        let mut migration_stores: BTreeMap<String, Arc<dyn MigrationStore>> = BTreeMap::new();
        for database in &settings.background_migrations.databases {
            if database.shares_config_with.is_some() {
                continue;
            }
            let db_pool = match database.url.as_deref() {
                Some(url) if url != settings.database.url => {
                    let config = DatabaseConfig {
                        url: url.to_string(),
                        ..settings.database.clone()
                    };
                    establish_async_connection_pool(&config).await?
                }
                _ => pool.clone(),
            };
            migration_stores.insert(
                database.name.clone(),
                Arc::new(MigrationRepository::new(db_pool)),
            );
        }

        let backends = Backends {
            builds: Arc::new(BuildRepository::new(pool.clone())),
            runners: Arc::new(RunnerRepository::new(
                pool.clone(),
                TimeDelta::seconds(settings.reaper.runner_online_timeout as i64),
            )),
            migration_stores,
            migration_jobs: Self::builtin_migration_jobs(pool)?,
            leases: leases.store(),
        };

        Self::assemble(
            settings,
            backends,
            Arc::new(SystemClock),
            Arc::new(LogErrorTracker),
        )
    }

    /// Wire components from already-constructed backends.
    pub fn assemble(
        settings: Settings,
        backends: Backends,
        clock: Arc<dyn Clock>,
        tracker: Arc<dyn ErrorTracker>,
    ) -> AppResult<Self> {
        let reaper_config = &settings.reaper;
        let reaper = StuckBuildsReaper::new(
            backends.builds,
            backends.runners,
            Arc::clone(&tracker),
            Arc::clone(&clock),
        )
        .with_config(reaper_config);
        let stuck_builds = StuckBuildsWorker::new(
            Arc::new(reaper),
            policies_from_config(reaper_config),
            Arc::clone(&backends.leases),
            Duration::from_secs(reaper_config.worker_lease_timeout),
        );

        let migrations = &settings.background_migrations;
        let mut databases = MigrationDatabases::new();
        for database in &migrations.databases {
            let owner = database.shares_config_with.as_deref().unwrap_or(&database.name);
            let store = backends
                .migration_stores
                .get(owner)
                .cloned()
                .ok_or_else(|| AppError::Configuration {
                    key: format!("background_migrations.databases.{}", database.name),
                    source: anyhow::anyhow!("no migration store for database '{}'", owner),
                })?;

            let mut tracking = TrackingDatabase::new(database.name.clone(), store);
            if let Some(other) = &database.shares_config_with {
                tracking = tracking.sharing_config_with(other.clone());
            }
            databases.insert(tracking);
        }

        let feature = MigrationFeature::new(migrations.enabled);
        let runner = BatchedMigrationRunner::new(
            Arc::new(backends.migration_jobs),
            tracker,
            Arc::clone(&clock),
            migrations.max_batch_attempts,
        );
        let databases = Arc::new(databases);
        let execution_worker = ExecutionWorker::new(
            Arc::clone(&databases),
            Arc::new(runner),
            Arc::clone(&backends.leases),
            Arc::clone(&clock),
            feature.clone(),
        )
        .with_lease_timeout_multiplier(migrations.lease_timeout_multiplier)
        .with_interval_variance(TimeDelta::seconds(migrations.interval_variance_seconds as i64));

        Ok(Self {
            settings: Arc::new(settings),
            leases: backends.leases,
            clock,
            stuck_builds: Arc::new(stuck_builds),
            migration_feature: feature,
            migration_databases: databases,
            execution_worker: Arc::new(execution_worker),
        })
    }

    fn builtin_migration_jobs(pool: AsyncDbPool) -> AppResult<MigrationJobRegistry> {
        let mut jobs = MigrationJobRegistry::new();
        jobs.register(Arc::new(CopyColumnJob::new(pool)))?;
        Ok(jobs)
    }

    /// One scheduler per tracking database, in name order.
    pub fn migration_schedulers(
        &self,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Vec<Arc<BatchedMigrationScheduler>> {
        self.migration_databases
            .iter()
            .map(|database| {
                Arc::new(BatchedMigrationScheduler::new(
                    database.clone(),
                    self.migration_feature.clone(),
                    Arc::clone(&dispatcher),
                    Arc::clone(&self.clock),
                    self.settings.background_migrations.max_running_migrations,
                ))
            })
            .collect()
    }

    /// The cron table: the stuck builds worker plus one migration scheduler
    /// per tracking database.
    pub fn build_registry(&self, dispatcher: Arc<dyn Dispatcher>) -> AppResult<JobRegistry> {
        let jobs_config = &self.settings.jobs;
        let reaper = &self.settings.reaper;
        let migrations = &self.settings.background_migrations;

        let mut registry = JobRegistry::new();
        registry.register(
            CronEntry::new("stuck_ci_builds", reaper.cron.clone(), jobs_config)
                .with_timeout(Duration::from_secs(reaper.worker_lease_timeout))
                .enabled(reaper.enabled),
            Arc::clone(&self.stuck_builds) as _,
        )?;

        for scheduler in self.migration_schedulers(dispatcher) {
            let name = format!("batched_background_migrations:{}", scheduler.database_name());
            registry.register(
                CronEntry::new(name.clone(), migrations.cron.clone(), jobs_config)
                    .with_dedup_key(name)
                    .with_timeout(Duration::from_secs(60)),
                scheduler,
            )?;
        }

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_migration::InlineDispatcher;
    use crate::config::TrackingDatabaseConfig;

    fn settings_with(databases: Vec<TrackingDatabaseConfig>) -> Settings {
        let mut settings = Settings::default();
        settings.background_migrations.databases = databases;
        settings
    }

    fn assemble(settings: Settings) -> AppResult<AppState> {
        let backends = InMemoryBackends::new(&settings).backends(MigrationJobRegistry::new());
        AppState::assemble(
            settings,
            backends,
            Arc::new(SystemClock),
            Arc::new(LogErrorTracker),
        )
    }

    #[test]
    fn test_registry_has_reaper_and_one_scheduler_per_database() {
        let settings = settings_with(vec![
            TrackingDatabaseConfig::default(),
            TrackingDatabaseConfig {
                name: "ci".to_string(),
                url: None,
                shares_config_with: Some("main".to_string()),
            },
        ]);
        let state = assemble(settings).unwrap();
        let dispatcher = Arc::new(InlineDispatcher::new(Arc::clone(&state.execution_worker)));

        let registry = state.build_registry(dispatcher).unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "stuck_ci_builds",
                "batched_background_migrations:ci",
                "batched_background_migrations:main",
            ]
        );
        let scheduler = registry.get("batched_background_migrations:main").unwrap();
        assert_eq!(
            scheduler.entry.dedup_key.as_deref(),
            Some("batched_background_migrations:main")
        );
    }

    #[test]
    fn test_shared_database_reuses_owner_store() {
        let settings = settings_with(vec![
            TrackingDatabaseConfig::default(),
            TrackingDatabaseConfig {
                name: "ci".to_string(),
                url: None,
                shares_config_with: Some("main".to_string()),
            },
        ]);
        let memory = InMemoryBackends::new(&settings);
        assert_eq!(memory.migrations.keys().collect::<Vec<_>>(), vec!["main"]);

        let state = AppState::assemble(
            settings,
            memory.backends(MigrationJobRegistry::new()),
            Arc::new(SystemClock),
            Arc::new(LogErrorTracker),
        )
        .unwrap();
        assert!(state.migration_databases.get("ci").unwrap().shares_config());
    }

    #[test]
    fn test_disabled_reaper_entry_is_not_scheduled() {
        let mut settings = settings_with(vec![TrackingDatabaseConfig::default()]);
        settings.reaper.enabled = false;
        let state = assemble(settings).unwrap();
        let dispatcher = Arc::new(InlineDispatcher::new(Arc::clone(&state.execution_worker)));

        let registry = state.build_registry(dispatcher).unwrap();
        let enabled: Vec<_> = registry.enabled().map(|j| j.entry.name.clone()).collect();
        assert_eq!(enabled, vec!["batched_background_migrations:main"]);
    }

    #[test]
    fn test_missing_store_is_a_configuration_error() {
        let settings = settings_with(vec![TrackingDatabaseConfig::default()]);
        let mut backends = InMemoryBackends::new(&settings).backends(MigrationJobRegistry::new());
        backends.migration_stores.clear();

        let result = AppState::assemble(
            settings,
            backends,
            Arc::new(SystemClock),
            Arc::new(LogErrorTracker),
        );
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }

    #[test]
    fn test_feature_flag_follows_settings() {
        let mut settings = settings_with(vec![TrackingDatabaseConfig::default()]);
        settings.background_migrations.enabled = false;
        let state = assemble(settings).unwrap();
        assert!(!state.migration_feature.is_enabled());
    }
}
