//! Configuration validation logic
//!
//! This module provides validation methods for all configuration structures
//! to ensure configuration values are within acceptable ranges and formats.

use std::collections::HashSet;

use crate::config::error::ConfigError;
use crate::config::settings::{
    BackgroundMigrationsConfig, DatabaseConfig, FileSettings, JobsConfig, LeaseBackend,
    LeaseConfig, LoggerSettings, ReaperConfig, Settings,
};
use crate::jobs::validate_cron_expression;

/// Valid log levels
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid log formats
const VALID_LOG_FORMATS: &[&str] = &["full", "compact", "json"];

impl DatabaseConfig {
    /// Validate database configuration
    ///
    /// # Validation Rules
    /// - URL must not be empty and must use a PostgreSQL scheme
    /// - Max and min connections must be greater than 0
    /// - Min connections must not exceed max connections
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::validation(
                "database.url",
                "Database URL is required. Please specify a valid database connection string.",
            ));
        }

        if !is_postgres_url(&self.url) {
            return Err(ConfigError::validation(
                "database.url",
                "Invalid database URL format. Expected format: postgres://[user:password@]host[:port]/database",
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::validation(
                "database.max_connections",
                "Max connections must be greater than 0.",
            ));
        }

        if self.min_connections == 0 {
            return Err(ConfigError::validation(
                "database.min_connections",
                "Min connections must be greater than 0.",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::ValidationError {
                field: "database.min_connections".to_string(),
                message: format!(
                    "Min connections ({}) cannot exceed max connections ({}).",
                    self.min_connections, self.max_connections
                ),
            });
        }

        Ok(())
    }
}

fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}

impl FileSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.path.trim().is_empty() {
            return Err(ConfigError::validation(
                "logger.file.path",
                "File path is required when file logging is enabled.",
            ));
        }

        if !VALID_LOG_FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.file.format".to_string(),
                message: format!(
                    "Invalid log format '{}'. Valid formats are: {}",
                    self.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        Ok(())
    }
}

impl LoggerSettings {
    /// Validate logger configuration
    ///
    /// The base level (the directive part without `target=`) must be a known
    /// level, and at least one output must be enabled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self
            .level
            .split(',')
            .find(|part| !part.contains('='))
            .unwrap_or("info")
            .trim()
            .to_lowercase();

        if !VALID_LOG_LEVELS.contains(&base.as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Valid levels are: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        if !self.console.enabled && !self.file.enabled {
            return Err(ConfigError::validation(
                "logger",
                "At least one output (console or file) must be enabled.",
            ));
        }

        self.file.validate()
    }
}

impl JobsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.job_timeout == 0 {
            return Err(ConfigError::validation(
                "jobs.job_timeout",
                "Job timeout must be greater than 0 seconds.",
            ));
        }

        if self.retry_backoff_multiplier < 1.0 {
            return Err(ConfigError::validation(
                "jobs.retry_backoff_multiplier",
                "Retry backoff multiplier must be at least 1.0.",
            ));
        }

        Ok(())
    }
}

impl LeaseConfig {
    /// Redis settings are only checked when Redis is the selected backend.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend != LeaseBackend::Redis {
            return Ok(());
        }

        let url = &self.redis.url;
        if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
            return Err(ConfigError::validation(
                "lease.redis.url",
                "Redis URL must start with redis:// or rediss://.",
            ));
        }

        if self.redis.pool_size == 0 {
            return Err(ConfigError::validation(
                "lease.redis.pool_size",
                "Redis pool size must be greater than 0.",
            ));
        }

        if self.redis.key_prefix.trim().is_empty() {
            return Err(ConfigError::validation(
                "lease.redis.key_prefix",
                "Redis key prefix must not be empty.",
            ));
        }

        Ok(())
    }
}

impl ReaperConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_cron_expression(&self.cron).map_err(|e| {
            ConfigError::validation("reaper.cron".to_string(), e.to_string())
        })?;

        if self.batch_size <= 0 {
            return Err(ConfigError::validation(
                "reaper.batch_size",
                "Batch size must be greater than 0.",
            ));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::validation(
                "reaper.max_attempts",
                "Max attempts must be at least 1.",
            ));
        }

        if self.retry_backoff_multiplier < 1.0 {
            return Err(ConfigError::validation(
                "reaper.retry_backoff_multiplier",
                "Retry backoff multiplier must be at least 1.0.",
            ));
        }

        let timeouts = [
            ("reaper.worker_lease_timeout", self.worker_lease_timeout),
            ("reaper.runner_online_timeout", self.runner_online_timeout),
            ("reaper.running_timeout", self.running_timeout),
            ("reaper.scheduled_timeout", self.scheduled_timeout),
            ("reaper.pending_outdated_timeout", self.pending_outdated_timeout),
            ("reaper.pending_stuck_timeout", self.pending_stuck_timeout),
            ("reaper.canceling_timeout", self.canceling_timeout),
        ];
        for (field, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::validation(
                    field,
                    "Timeout must be greater than 0 seconds.",
                ));
            }
        }

        Ok(())
    }
}

impl BackgroundMigrationsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_cron_expression(&self.cron).map_err(|e| {
            ConfigError::validation("background_migrations.cron".to_string(), e.to_string())
        })?;

        if self.max_running_migrations <= 0 {
            return Err(ConfigError::validation(
                "background_migrations.max_running_migrations",
                "Max running migrations must be greater than 0.",
            ));
        }

        if self.lease_timeout_multiplier == 0 {
            return Err(ConfigError::validation(
                "background_migrations.lease_timeout_multiplier",
                "Lease timeout multiplier must be greater than 0.",
            ));
        }

        if self.max_batch_attempts <= 0 {
            return Err(ConfigError::validation(
                "background_migrations.max_batch_attempts",
                "Max batch attempts must be greater than 0.",
            ));
        }

        if self.databases.is_empty() {
            return Err(ConfigError::validation(
                "background_migrations.databases",
                "At least one tracking database must be configured.",
            ));
        }

        let names: HashSet<&str> = self.databases.iter().map(|db| db.name.as_str()).collect();
        if names.len() != self.databases.len() {
            return Err(ConfigError::validation(
                "background_migrations.databases",
                "Tracking database names must be unique.",
            ));
        }

        for db in &self.databases {
            if db.name.trim().is_empty() {
                return Err(ConfigError::validation(
                    "background_migrations.databases.name",
                    "Tracking database name must not be empty.",
                ));
            }

            if let Some(url) = &db.url {
                if !is_postgres_url(url) {
                    return Err(ConfigError::ValidationError {
                        field: format!("background_migrations.databases.{}.url", db.name),
                        message: "Expected a postgres:// URL.".to_string(),
                    });
                }
            }

            if let Some(shared) = &db.shares_config_with {
                if shared == &db.name || !names.contains(shared.as_str()) {
                    return Err(ConfigError::ValidationError {
                        field: format!(
                            "background_migrations.databases.{}.shares_config_with",
                            db.name
                        ),
                        message: format!("'{}' is not another configured database.", shared),
                    });
                }
            }
        }

        Ok(())
    }
}

impl Settings {
    /// Validate every section, stopping at the first error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.logger.validate()?;
        self.jobs.validate()?;
        self.lease.validate()?;
        self.reaper.validate()?;
        self.background_migrations.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::TrackingDatabaseConfig;

    fn valid_settings() -> Settings {
        Settings {
            database: DatabaseConfig {
                url: "postgres://warden@localhost/ci".to_string(),
                ..DatabaseConfig::default()
            },
            ..Settings::default()
        }
    }

    fn field_of(err: ConfigError) -> String {
        match err {
            ConfigError::ValidationError { field, .. } => field,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_defaults_with_database_url_are_valid() {
        assert!(valid_settings().validate().is_ok());
    }

    #[test]
    fn test_database_url_required() {
        let err = Settings::default().validate().unwrap_err();
        assert_eq!(field_of(err), "database.url");
    }

    #[test]
    fn test_database_rejects_non_postgres_url() {
        let mut settings = valid_settings();
        settings.database.url = "mysql://localhost/ci".to_string();
        assert_eq!(field_of(settings.validate().unwrap_err()), "database.url");
    }

    #[test]
    fn test_min_connections_cannot_exceed_max() {
        let mut settings = valid_settings();
        settings.database.min_connections = 20;
        assert_eq!(
            field_of(settings.validate().unwrap_err()),
            "database.min_connections"
        );
    }

    #[test]
    fn test_logger_level_with_directives() {
        let mut settings = valid_settings();
        settings.logger.level = "info,warden_rs::reaper=debug".to_string();
        assert!(settings.validate().is_ok());

        settings.logger.level = "chatty".to_string();
        assert_eq!(field_of(settings.validate().unwrap_err()), "logger.level");
    }

    #[test]
    fn test_reaper_rejects_five_field_cron() {
        let mut settings = valid_settings();
        settings.reaper.cron = "0 * * * *".to_string();
        assert_eq!(field_of(settings.validate().unwrap_err()), "reaper.cron");
    }

    #[test]
    fn test_reaper_rejects_zero_timeout() {
        let mut settings = valid_settings();
        settings.reaper.canceling_timeout = 0;
        assert_eq!(
            field_of(settings.validate().unwrap_err()),
            "reaper.canceling_timeout"
        );
    }

    #[test]
    fn test_redis_settings_ignored_for_memory_backend() {
        let mut settings = valid_settings();
        settings.lease.redis.url = "http://nope".to_string();
        assert!(settings.validate().is_ok());

        settings.lease.backend = LeaseBackend::Redis;
        assert_eq!(field_of(settings.validate().unwrap_err()), "lease.redis.url");
    }

    #[test]
    fn test_tracking_databases_must_be_unique() {
        let mut settings = valid_settings();
        settings.background_migrations.databases = vec![
            TrackingDatabaseConfig::default(),
            TrackingDatabaseConfig::default(),
        ];
        assert_eq!(
            field_of(settings.validate().unwrap_err()),
            "background_migrations.databases"
        );
    }

    #[test]
    fn test_shares_config_with_must_name_another_database() {
        let mut settings = valid_settings();
        settings.background_migrations.databases = vec![
            TrackingDatabaseConfig::default(),
            TrackingDatabaseConfig {
                name: "ci".to_string(),
                url: None,
                shares_config_with: Some("main".to_string()),
            },
        ];
        assert!(settings.validate().is_ok());

        settings.background_migrations.databases[1].shares_config_with =
            Some("sec".to_string());
        assert_eq!(
            field_of(settings.validate().unwrap_err()),
            "background_migrations.databases.ci.shares_config_with"
        );
    }
}
