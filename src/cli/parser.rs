//! CLI argument parsing with clap
//!
//! This module defines the command-line interface structure using clap,
//! including all commands, arguments, and their documentation.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::Environment as AppEnvironment;

/// Stuck CI build reaper and batched background migration scheduler
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Stuck CI build reaper and batched background migration scheduler")]
#[command(long_about = "
Warden runs the periodic maintenance of a CI platform: it fails builds that
are stuck in scheduled, pending, running or canceling, and drives batched
background migrations one leased batch at a time.

EXAMPLES:
    # Run the cron runner until Ctrl+C / SIGTERM
    warden serve

    # Validate configuration without starting anything
    warden serve --dry-run

    # Run one reaper pass for every policy, or just one
    warden reap
    warden reap --policy running

    # Run one scheduler pass and execute the selected batches inline
    warden schedule-migrations

    # Apply, preview or roll back schema migrations
    warden migrate
    warden migrate --dry-run
    warden migrate --rollback 1

    # Use a single configuration file and debug logging
    warden --config /etc/warden/production.toml --verbose serve
")]
#[command(version = crate::clap_long_version())]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    ///
    /// Load this single TOML file instead of the layered `config/` directory.
    /// `WARDEN_*` environment variables still apply on top.
    #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Override environment detection (`WARDEN_APP_ENV`)
    ///
    /// Selects which `{environment}.toml` is layered over `default.toml`.
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Enable debug logging. Cannot be used with --quiet.
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors. Cannot be used with --verbose.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level override, takes precedence over --verbose/--quiet
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the cron runner (default)
    ///
    /// Schedules the stuck builds worker and one batched migration scheduler
    /// per tracking database, then waits for Ctrl+C or SIGTERM.
    Serve {
        /// Validate configuration and print the cron table, then exit
        #[arg(long)]
        dry_run: bool,
    },
    /// Run one stuck builds pass under the worker lease
    ///
    /// Examples:
    ///   warden reap                       # All policies in order
    ///   warden reap --policy pending_stuck
    Reap {
        /// Only run the named drop policy
        #[arg(long, value_name = "NAME", value_parser = super::validation::validate_policy_name)]
        policy: Option<String>,
    },
    /// Run one batched migration scheduler pass
    ///
    /// Selected migrations are executed inline, one batch each, and the
    /// outcomes are printed.
    ScheduleMigrations {
        /// Only schedule this tracking database
        #[arg(long, value_name = "NAME")]
        database: Option<String>,
    },
    /// Database schema migrations for the tables this service reads
    ///
    /// Examples:
    ///   warden migrate                    # Apply all pending migrations
    ///   warden migrate --dry-run          # Show pending migrations without applying
    ///   warden migrate --rollback 3       # Rollback the last 3 migrations
    Migrate {
        /// Show pending migrations without applying
        #[arg(long, conflicts_with = "rollback")]
        dry_run: bool,

        /// Number of migrations to rollback (1-100)
        #[arg(long, value_name = "STEPS", conflicts_with = "dry_run", value_parser = super::validation::validate_rollback_steps)]
        rollback: Option<u32>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "test")]
    Test,
    #[value(name = "staging", alias = "stage")]
    Staging,
    #[value(name = "production", alias = "prod")]
    Production,
}

impl From<Environment> for AppEnvironment {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => AppEnvironment::Development,
            Environment::Test => AppEnvironment::Test,
            Environment::Staging => AppEnvironment::Staging,
            Environment::Production => AppEnvironment::Production,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    #[value(name = "error")]
    Error,
    #[value(name = "warn", alias = "warning")]
    Warn,
    #[value(name = "info")]
    Info,
    #[value(name = "debug")]
    Debug,
    #[value(name = "trace")]
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_string()
    }
}

impl Cli {
    /// Argument combinations clap cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(Commands::Migrate {
            dry_run: true,
            rollback: Some(_),
        }) = self.command
        {
            return Err("Cannot use --dry-run and --rollback together".to_string());
        }

        if let Some(Commands::ScheduleMigrations {
            database: Some(name),
        }) = &self.command
            && name.trim().is_empty()
        {
            return Err("--database must not be empty".to_string());
        }

        Ok(())
    }

    /// The level implied by the global flags, if any.
    pub fn effective_log_level(&self) -> Option<String> {
        if let Some(level) = self.log_level {
            return Some(level.into());
        }
        if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        }
    }
}
