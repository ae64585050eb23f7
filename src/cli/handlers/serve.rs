//! Serve command handler
//!
//! Runs the cron runner, or with `--dry-run` validates configuration and
//! prints the cron table that would be scheduled.

use crate::cli::handlers::MigrateCommandHandler;
use crate::config::Settings;
use crate::error::AppResult;
use crate::server::Server;
use crate::state::AppState;

pub struct ServeCommandHandler {
    config: Settings,
}

impl ServeCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    pub async fn execute(&self, dry_run: bool) -> AppResult<()> {
        if dry_run {
            return self.validate_only();
        }

        if self.config.database.auto_migrate {
            MigrateCommandHandler::new(self.config.clone())
                .run_migrations()
                .await?;
        }

        let state = AppState::connect(self.config.clone()).await?;
        tracing::info!("Application state created");
        Server::new(state).run().await
    }

    /// Validate configuration and print what would run.
    pub fn validate_only(&self) -> AppResult<()> {
        self.config.validate()?;

        println!("✓ Configuration is valid");
        for line in self.cron_table() {
            println!("  {}", line);
        }
        println!("✓ Lease backend: {:?}", self.config.lease.backend);
        if !self.config.jobs.enabled {
            println!("! Job scheduling is disabled (jobs.enabled = false)");
        }
        println!("Dry run completed successfully");
        Ok(())
    }

    /// One line per cron entry `serve` would register.
    pub fn cron_table(&self) -> Vec<String> {
        let reaper = &self.config.reaper;
        let migrations = &self.config.background_migrations;

        let mut lines = vec![format!(
            "stuck_ci_builds [{}]{}",
            reaper.cron,
            if reaper.enabled { "" } else { " (disabled)" }
        )];
        let mut names: Vec<&str> = migrations.databases.iter().map(|d| d.name.as_str()).collect();
        names.sort_unstable();
        for name in names {
            lines.push(format!(
                "batched_background_migrations:{} [{}]{}",
                name,
                migrations.cron,
                if migrations.enabled { "" } else { " (feature off)" }
            ));
        }
        lines
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}
