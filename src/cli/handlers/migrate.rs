//! Migrate command handler
//!
//! Applies, previews or reverts the embedded schema migrations on a
//! blocking `PgConnection`.

use diesel::Connection;
use diesel::pg::PgConnection;
use diesel_migrations::MigrationHarness;

use crate::config::Settings;
use crate::db::MIGRATIONS;
use crate::error::{AppError, AppResult};

pub struct MigrateCommandHandler {
    config: Settings,
}

impl MigrateCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    pub async fn execute(&self, dry_run: bool, rollback: Option<u32>) -> AppResult<()> {
        self.config.database.validate()?;

        if dry_run {
            return self.show_pending_migrations().await;
        }

        match rollback {
            Some(steps) => self.rollback_migrations(steps).await,
            None => self.run_migrations().await.map(|_| ()),
        }
    }

    async fn show_pending_migrations(&self) -> AppResult<()> {
        println!("Checking for pending migrations...");

        let pending = self
            .with_connection("check pending migrations", |conn| {
                let pending = conn
                    .pending_migrations(MIGRATIONS)
                    .map_err(|e| migration_error("check pending migrations", e))?;
                Ok(pending.iter().map(|m| m.name().to_string()).collect::<Vec<_>>())
            })
            .await?;

        if pending.is_empty() {
            println!("✓ No pending migrations found - database is up to date");
        } else {
            println!("Found {} pending migration(s):", pending.len());
            for name in &pending {
                println!("  - {}", name);
            }
            println!("\nRun without --dry-run to apply these migrations");
        }

        Ok(())
    }

    /// Apply every pending migration and return their names.
    pub async fn run_migrations(&self) -> AppResult<Vec<String>> {
        tracing::info!("Running database migrations");

        let applied = self
            .with_connection("run pending migrations", |conn| {
                let applied = conn
                    .run_pending_migrations(MIGRATIONS)
                    .map_err(|e| migration_error("run pending migrations", e))?;
                Ok(applied.iter().map(|m| m.to_string()).collect::<Vec<_>>())
            })
            .await?;

        if applied.is_empty() {
            tracing::info!("No migrations to apply");
        } else {
            tracing::info!(migrations = ?applied, "Applied migrations");
        }

        Ok(applied)
    }

    async fn rollback_migrations(&self, steps: u32) -> AppResult<()> {
        if steps == 0 {
            return Err(AppError::Validation {
                field: "rollback_steps".to_string(),
                reason: "Number of rollback steps must be greater than 0".to_string(),
            });
        }

        println!("Rolling back {} migration(s)...", steps);

        let reverted = self
            .with_connection("revert migrations", move |conn| {
                let applied = conn
                    .applied_migrations()
                    .map_err(|e| migration_error("get applied migrations", e))?;

                if applied.len() < steps as usize {
                    return Err(AppError::Validation {
                        field: "rollback_steps".to_string(),
                        reason: format!(
                            "Cannot rollback {} migrations - only {} applied migrations available",
                            steps,
                            applied.len()
                        ),
                    });
                }

                let mut reverted = Vec::with_capacity(steps as usize);
                for _ in 0..steps {
                    let version = conn
                        .revert_last_migration(MIGRATIONS)
                        .map_err(|e| migration_error("revert migration", e))?;
                    reverted.push(version.to_string());
                }
                Ok(reverted)
            })
            .await?;

        println!("✓ Rolled back {} migration(s):", reverted.len());
        for version in &reverted {
            println!("  - {}", version);
        }

        Ok(())
    }

    /// Run `f` on a fresh blocking connection off the async runtime.
    async fn with_connection<T, F>(&self, operation: &'static str, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> AppResult<T> + Send + 'static,
    {
        let database_url = self.config.database.url.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn =
                PgConnection::establish(&database_url).map_err(|e| AppError::Database {
                    operation: format!("establish connection to {}", operation),
                    source: anyhow::anyhow!("Connection error: {}", e),
                })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| AppError::Internal {
            source: anyhow::Error::from(e),
        })?
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}

fn migration_error(
    operation: &str,
    error: Box<dyn std::error::Error + Send + Sync>,
) -> AppError {
    AppError::Database {
        operation: operation.to_string(),
        source: anyhow::anyhow!("Migration error: {}", error),
    }
}
