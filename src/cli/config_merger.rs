//! Configuration merger for CLI arguments and config files
//!
//! Loads settings through `ConfigLoader` honoring `--config`/`--env`, then
//! applies the logging flags on top.

use super::parser::Cli;
use crate::config::error::ConfigError;
use crate::config::{ConfigLoader, Settings};

/// CLI arguments override configuration file values.
pub struct ConfigurationMerger {
    base_config: Settings,
}

impl ConfigurationMerger {
    pub fn new(base_config: Settings) -> Self {
        Self { base_config }
    }

    /// Load the base configuration as selected by the global CLI flags.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut loader = ConfigLoader::new()?;
        if let Some(path) = &cli.config {
            loader = loader.with_config_file(path);
        }
        if let Some(env) = cli.env {
            loader = loader.with_environment(env.into());
        }

        tracing::debug!(
            environment = %loader.environment(),
            config_file = ?loader.config_file(),
            "Loading configuration"
        );
        Ok(Self::new(loader.load()?))
    }

    /// Apply CLI overrides and re-validate.
    pub fn merge_cli_args(&self, cli: &Cli) -> Result<Settings, ConfigError> {
        let mut config = self.base_config.clone();

        if let Some(level) = cli.effective_log_level() {
            config.logger.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn config(&self) -> &Settings {
        &self.base_config
    }
}
