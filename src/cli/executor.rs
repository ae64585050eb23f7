//! Command executor for dispatching CLI commands
//!
//! Entry point after parsing and configuration loading.

use super::handlers::{
    MigrateCommandHandler, ReapCommandHandler, ScheduleMigrationsCommandHandler,
    ServeCommandHandler,
};
use super::parser::{Cli, Commands};
use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Execute a CLI command with merged and validated settings.
///
/// No subcommand means `serve`.
pub async fn execute_command(cli: &Cli, settings: Settings) -> AppResult<()> {
    cli.validate().map_err(|reason| AppError::Validation {
        field: "cli_arguments".to_string(),
        reason,
    })?;

    match &cli.command {
        Some(Commands::Serve { dry_run }) => ServeCommandHandler::new(settings).execute(*dry_run).await,
        None => ServeCommandHandler::new(settings).execute(false).await,
        Some(Commands::Reap { policy }) => {
            let state = AppState::connect(settings).await?;
            ReapCommandHandler::new(state).execute(policy.as_deref()).await
        }
        Some(Commands::ScheduleMigrations { database }) => {
            let state = AppState::connect(settings).await?;
            ScheduleMigrationsCommandHandler::new(state)
                .execute(database.as_deref())
                .await
        }
        Some(Commands::Migrate { dry_run, rollback }) => {
            if let Some(steps) = rollback
                && *steps > 50
            {
                tracing::warn!(steps, "Rolling back a large number of migrations");
            }
            MigrateCommandHandler::new(settings)
                .execute(*dry_run, *rollback)
                .await
        }
    }
}
