//! Configuration settings structures for warden-rs
//!
//! This module defines all configuration structures that can be loaded from
//! TOML files and environment variables.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::environment::Environment;
use crate::config::error::ConfigError;
use crate::logger::{ConsoleConfig, FileConfig, LogFormat, LoggerConfig};

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "warden-rs".to_string()
}

fn default_app_version() -> String {
    crate::pkg_version().to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> String {
    "logs/warden.log".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

// ============================================================================
// Application Configuration
// ============================================================================

/// Application basic information configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Application version
    #[serde(default = "default_app_version")]
    pub version: String,

    /// Set by the loader from `WARDEN_APP_ENV` or `--env`
    #[serde(default)]
    pub environment: Environment,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
            environment: Environment::default(),
        }
    }
}

// ============================================================================
// Database Configuration
// ============================================================================

/// Diesel database connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,

    /// Whether to automatically run pending migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout: default_connection_timeout(),
            auto_migrate: false,
        }
    }
}

// ============================================================================
// Logger Configuration
// ============================================================================

/// Console output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Colors are also suppressed when stdout is not a terminal
    #[serde(default = "default_true")]
    pub colored: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            colored: true,
        }
    }
}

/// File output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_path")]
    pub path: String,

    /// Append to an existing file instead of truncating it
    #[serde(default = "default_true")]
    pub append: bool,

    /// "full", "compact" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_log_path(),
            append: true,
            format: default_log_format(),
        }
    }
}

/// Logger configuration as it appears in the config files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSettings {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub console: ConsoleSettings,

    #[serde(default)]
    pub file: FileSettings,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: ConsoleSettings::default(),
            file: FileSettings::default(),
        }
    }
}

impl LoggerSettings {
    /// Convert the file representation into the runtime `LoggerConfig`.
    pub fn into_logger_config(self) -> Result<LoggerConfig, ConfigError> {
        let console_config = ConsoleConfig::new(self.console.enabled, self.console.colored);
        let file_config = self.file.into_file_config()?;

        LoggerConfig::new(console_config, file_config, self.level).map_err(|e| {
            ConfigError::ValidationError {
                field: "logger".to_string(),
                message: e.to_string(),
            }
        })
    }
}

impl FileSettings {
    pub fn into_file_config(self) -> Result<FileConfig, ConfigError> {
        let format = self
            .format
            .parse::<LogFormat>()
            .map_err(|e| ConfigError::ValidationError {
                field: "logger.file.format".to_string(),
                message: e.to_string(),
            })?;

        FileConfig::new(self.enabled, PathBuf::from(self.path), self.append, format).map_err(
            |e| ConfigError::ValidationError {
                field: "logger.file".to_string(),
                message: e.to_string(),
            },
        )
    }
}

// ============================================================================
// Jobs Configuration
// ============================================================================

fn default_job_timeout() -> u64 {
    3600
}

fn default_max_retries() -> u32 {
    0
}

fn default_retry_delay() -> u64 {
    60
}

fn default_retry_backoff() -> f64 {
    2.0
}

/// Cron runner configuration shared by every scheduled job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Whether the cron runner starts with `serve`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Job execution timeout in seconds
    #[serde(default = "default_job_timeout")]
    pub job_timeout: u64,

    /// Retries after a failed run; the next cron tick is the usual retry
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial retry delay in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_multiplier: f64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            job_timeout: default_job_timeout(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            retry_backoff_multiplier: default_retry_backoff(),
        }
    }
}

// ============================================================================
// Lease Configuration
// ============================================================================

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_redis_pool_size() -> u32 {
    4
}

fn default_redis_connection_timeout() -> u64 {
    5
}

fn default_redis_key_prefix() -> String {
    "warden".to_string()
}

/// Where exclusive leases live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LeaseBackend {
    /// Process-local; only safe with a single instance
    #[default]
    Memory,
    Redis,
}

/// Redis lease store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisLeaseConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,

    #[serde(default = "default_redis_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_redis_connection_timeout")]
    pub connection_timeout: u64,

    /// Prepended to every lease key
    #[serde(default = "default_redis_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisLeaseConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            connection_timeout: default_redis_connection_timeout(),
            key_prefix: default_redis_key_prefix(),
        }
    }
}

/// Exclusive lease configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LeaseConfig {
    #[serde(default)]
    pub backend: LeaseBackend,

    #[serde(default)]
    pub redis: RedisLeaseConfig,
}

// ============================================================================
// Stuck Builds Reaper Configuration
// ============================================================================

fn default_reaper_cron() -> String {
    "0 0 * * * *".to_string()
}

fn default_reaper_batch_size() -> i64 {
    100
}

fn default_reaper_max_attempts() -> u32 {
    3
}

fn default_reaper_retry_base_delay_ms() -> u64 {
    50
}

fn default_reaper_lease_timeout() -> u64 {
    30 * 60
}

fn default_runner_online_timeout() -> u64 {
    2 * 60 * 60
}

fn default_one_hour() -> u64 {
    60 * 60
}

fn default_one_day() -> u64 {
    24 * 60 * 60
}

/// Stuck builds reaper configuration. Timeouts are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaperConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Six-field cron expression
    #[serde(default = "default_reaper_cron")]
    pub cron: String,

    /// Page size for each stale-build query
    #[serde(default = "default_reaper_batch_size")]
    pub batch_size: i64,

    /// Optimistic-lock attempts per drop
    #[serde(default = "default_reaper_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_reaper_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_multiplier: f64,

    /// TTL of the worker's exclusive lease
    #[serde(default = "default_reaper_lease_timeout")]
    pub worker_lease_timeout: u64,

    /// A runner is online if it contacted us within this window
    #[serde(default = "default_runner_online_timeout")]
    pub runner_online_timeout: u64,

    #[serde(default = "default_one_hour")]
    pub running_timeout: u64,

    #[serde(default = "default_one_hour")]
    pub scheduled_timeout: u64,

    #[serde(default = "default_one_day")]
    pub pending_outdated_timeout: u64,

    #[serde(default = "default_one_hour")]
    pub pending_stuck_timeout: u64,

    #[serde(default = "default_one_hour")]
    pub canceling_timeout: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: default_reaper_cron(),
            batch_size: default_reaper_batch_size(),
            max_attempts: default_reaper_max_attempts(),
            retry_base_delay_ms: default_reaper_retry_base_delay_ms(),
            retry_backoff_multiplier: default_retry_backoff(),
            worker_lease_timeout: default_reaper_lease_timeout(),
            runner_online_timeout: default_runner_online_timeout(),
            running_timeout: default_one_hour(),
            scheduled_timeout: default_one_hour(),
            pending_outdated_timeout: default_one_day(),
            pending_stuck_timeout: default_one_hour(),
            canceling_timeout: default_one_hour(),
        }
    }
}

// ============================================================================
// Batched Background Migrations Configuration
// ============================================================================

fn default_migrations_cron() -> String {
    "0 * * * * *".to_string()
}

fn default_max_running_migrations() -> i64 {
    2
}

fn default_lease_timeout_multiplier() -> u32 {
    3
}

fn default_interval_variance_seconds() -> u64 {
    5
}

fn default_max_batch_attempts() -> i32 {
    3
}

fn default_main_database() -> String {
    "main".to_string()
}

fn default_tracking_databases() -> Vec<TrackingDatabaseConfig> {
    vec![TrackingDatabaseConfig::default()]
}

/// A database whose `batched_background_migrations` table is scheduled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingDatabaseConfig {
    #[serde(default = "default_main_database")]
    pub name: String,

    /// Connection URL; falls back to `database.url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Name of a database whose connection this one reuses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares_config_with: Option<String>,
}

impl Default for TrackingDatabaseConfig {
    fn default() -> Self {
        Self {
            name: default_main_database(),
            url: None,
            shares_config_with: None,
        }
    }
}

/// Batched background migration scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundMigrationsConfig {
    /// Feature flag; checked on every scheduler and execution run
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_migrations_cron")]
    pub cron: String,

    /// Upper bound on migrations enqueued per database per run
    #[serde(default = "default_max_running_migrations")]
    pub max_running_migrations: i64,

    /// Execution lease TTL is `interval * multiplier`
    #[serde(default = "default_lease_timeout_multiplier")]
    pub lease_timeout_multiplier: u32,

    /// Slack subtracted from the interval when re-checking inside the lease
    #[serde(default = "default_interval_variance_seconds")]
    pub interval_variance_seconds: u64,

    /// Failed attempts after which a migration is marked failed
    #[serde(default = "default_max_batch_attempts")]
    pub max_batch_attempts: i32,

    #[serde(default = "default_tracking_databases")]
    pub databases: Vec<TrackingDatabaseConfig>,
}

impl Default for BackgroundMigrationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: default_migrations_cron(),
            max_running_migrations: default_max_running_migrations(),
            lease_timeout_multiplier: default_lease_timeout_multiplier(),
            interval_variance_seconds: default_interval_variance_seconds(),
            max_batch_attempts: default_max_batch_attempts(),
            databases: default_tracking_databases(),
        }
    }
}

// ============================================================================
// Main Settings Structure
// ============================================================================

/// Complete application settings
///
/// This structure represents the entire configuration that can be loaded
/// from TOML files and environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub application: ApplicationConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logger: LoggerSettings,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub lease: LeaseConfig,

    #[serde(default)]
    pub reaper: ReaperConfig,

    #[serde(default)]
    pub background_migrations: BackgroundMigrationsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ========================================================================
    // Arbitrary implementations for property-based testing
    // ========================================================================

    fn arb_application_config() -> impl Strategy<Value = ApplicationConfig> {
        (
            "[a-z][a-z0-9-]{0,20}",
            "[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}",
        )
            .prop_map(|(name, version)| ApplicationConfig {
                name,
                version,
                environment: Environment::default(),
            })
    }

    fn arb_database_config() -> impl Strategy<Value = DatabaseConfig> {
        (
            "postgres://[a-z]{1,8}@localhost/[a-z]{1,8}",
            1u32..=100,
            1u32..=10,
            1u64..=300,
            any::<bool>(),
        )
            .prop_map(|(url, max, min, timeout, auto_migrate)| DatabaseConfig {
                url,
                max_connections: max.max(min),
                min_connections: min,
                connection_timeout: timeout,
                auto_migrate,
            })
    }

    fn arb_logger_settings() -> impl Strategy<Value = LoggerSettings> {
        (
            prop::sample::select(vec!["trace", "debug", "info", "warn", "error"]),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            "logs/[a-z]{1,8}\\.log",
            prop::sample::select(vec!["full", "compact", "json"]),
        )
            .prop_map(
                |(level, console_enabled, colored, file_enabled, path, format)| LoggerSettings {
                    level: level.to_string(),
                    console: ConsoleSettings {
                        enabled: console_enabled,
                        colored,
                    },
                    file: FileSettings {
                        enabled: file_enabled,
                        path,
                        append: true,
                        format: format.to_string(),
                    },
                },
            )
    }

    fn arb_jobs_config() -> impl Strategy<Value = JobsConfig> {
        (any::<bool>(), 1u64..=7200, 0u32..=5, 1u64..=600, 1u32..=4).prop_map(
            |(enabled, job_timeout, max_retries, retry_delay, backoff)| JobsConfig {
                enabled,
                job_timeout,
                max_retries,
                retry_delay,
                retry_backoff_multiplier: backoff as f64,
            },
        )
    }

    fn arb_lease_config() -> impl Strategy<Value = LeaseConfig> {
        (
            prop::sample::select(vec![LeaseBackend::Memory, LeaseBackend::Redis]),
            1u32..=32,
            "[a-z]{1,10}",
        )
            .prop_map(|(backend, pool_size, key_prefix)| LeaseConfig {
                backend,
                redis: RedisLeaseConfig {
                    pool_size,
                    key_prefix,
                    ..RedisLeaseConfig::default()
                },
            })
    }

    fn arb_reaper_config() -> impl Strategy<Value = ReaperConfig> {
        (1i64..=1000, 1u32..=10, 60u64..=86_400, 60u64..=172_800).prop_map(
            |(batch_size, max_attempts, running_timeout, pending_outdated_timeout)| ReaperConfig {
                batch_size,
                max_attempts,
                running_timeout,
                pending_outdated_timeout,
                ..ReaperConfig::default()
            },
        )
    }

    fn arb_background_migrations_config() -> impl Strategy<Value = BackgroundMigrationsConfig> {
        (
            1i64..=10,
            1u32..=10,
            prop::collection::vec("[a-z]{1,8}", 1..4),
        )
            .prop_map(|(max_running, multiplier, names)| BackgroundMigrationsConfig {
                max_running_migrations: max_running,
                lease_timeout_multiplier: multiplier,
                databases: names
                    .into_iter()
                    .map(|name| TrackingDatabaseConfig {
                        name,
                        ..TrackingDatabaseConfig::default()
                    })
                    .collect(),
                ..BackgroundMigrationsConfig::default()
            })
    }

    fn arb_settings() -> impl Strategy<Value = Settings> {
        (
            arb_application_config(),
            arb_database_config(),
            arb_logger_settings(),
            arb_jobs_config(),
            arb_lease_config(),
            arb_reaper_config(),
            arb_background_migrations_config(),
        )
            .prop_map(
                |(application, database, logger, jobs, lease, reaper, background_migrations)| {
                    Settings {
                        application,
                        database,
                        logger,
                        jobs,
                        lease,
                        reaper,
                        background_migrations,
                    }
                },
            )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_settings_round_trip_serialization(settings in arb_settings()) {
            let toml_str = toml::to_string(&settings)
                .expect("Settings should serialize to TOML");

            let deserialized: Settings = toml::from_str(&toml_str)
                .expect("TOML should deserialize back to Settings");

            prop_assert_eq!(settings, deserialized);
        }
    }

    #[test]
    fn test_application_config_defaults() {
        let config = ApplicationConfig::default();
        assert_eq!(config.name, "warden-rs");
        assert_eq!(config.version, crate::pkg_version());
    }

    #[test]
    fn test_reaper_config_defaults() {
        let config = ReaperConfig::default();
        assert_eq!(config.cron, "0 0 * * * *");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.running_timeout, 3600);
        assert_eq!(config.pending_outdated_timeout, 86_400);
        assert_eq!(config.worker_lease_timeout, 1800);
    }

    #[test]
    fn test_background_migrations_defaults() {
        let config = BackgroundMigrationsConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_running_migrations, 2);
        assert_eq!(config.databases.len(), 1);
        assert_eq!(config.databases[0].name, "main");
    }

    #[test]
    fn test_lease_backend_deserializes_lowercase() {
        let config: LeaseConfig = toml::from_str("backend = \"redis\"").unwrap();
        assert_eq!(config.backend, LeaseBackend::Redis);
        assert_eq!(config.redis.key_prefix, "warden");
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_logger_settings_conversion() {
        let settings = LoggerSettings {
            file: FileSettings {
                enabled: true,
                format: "compact".to_string(),
                ..FileSettings::default()
            },
            ..LoggerSettings::default()
        };

        let config = settings.into_logger_config().unwrap();
        assert_eq!(config.file.format, LogFormat::Compact);
        assert!(config.file.enabled);
    }

    #[test]
    fn test_logger_settings_rejects_bad_format() {
        let settings = LoggerSettings {
            file: FileSettings {
                format: "xml".to_string(),
                ..FileSettings::default()
            },
            ..LoggerSettings::default()
        };
        assert!(settings.into_logger_config().is_err());
    }
}
