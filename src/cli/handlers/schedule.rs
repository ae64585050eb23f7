//! Schedule-migrations command handler
//!
//! One scheduler pass per tracking database with executions run inline.

use std::sync::Arc;

use crate::background_migration::{ExecutionOutcome, ExecutionRequest, InlineDispatcher};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub struct ScheduleMigrationsCommandHandler {
    state: AppState,
}

impl ScheduleMigrationsCommandHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Run the schedulers, optionally restricted to one database, and return
    /// every execution outcome in dispatch order.
    pub async fn run(
        &self,
        database: Option<&str>,
    ) -> AppResult<Vec<(ExecutionRequest, ExecutionOutcome)>> {
        if let Some(name) = database
            && self.state.migration_databases.get(name).is_none()
        {
            return Err(AppError::Validation {
                field: "database".to_string(),
                reason: format!("unknown tracking database '{}'", name),
            });
        }

        let dispatcher = Arc::new(InlineDispatcher::new(Arc::clone(
            &self.state.execution_worker,
        )));
        for scheduler in self.state.migration_schedulers(dispatcher.clone()) {
            if database.is_some_and(|name| name != scheduler.database_name()) {
                continue;
            }
            scheduler.perform().await?;
        }

        Ok(dispatcher.take_outcomes().await)
    }

    pub async fn execute(&self, database: Option<&str>) -> AppResult<()> {
        if !self.state.migration_feature.is_enabled() {
            println!("Batched background migrations are disabled");
            return Ok(());
        }

        let outcomes = self.run(database).await?;
        if outcomes.is_empty() {
            println!("✓ No migrations due");
            return Ok(());
        }

        for (request, outcome) in &outcomes {
            println!(
                "{}#{} -> {:?}",
                request.database_name, request.migration_id, outcome
            );
        }
        println!("✓ {} execution(s) dispatched", outcomes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::background_migration::MigrationJobRegistry;
    use crate::clock::SystemClock;
    use crate::config::Settings;
    use crate::error::LogErrorTracker;
    use crate::state::InMemoryBackends;

    fn handler() -> ScheduleMigrationsCommandHandler {
        let settings = Settings::default();
        let backends = InMemoryBackends::new(&settings).backends(MigrationJobRegistry::new());
        let state = AppState::assemble(
            settings,
            backends,
            Arc::new(SystemClock),
            Arc::new(LogErrorTracker),
        )
        .unwrap();
        ScheduleMigrationsCommandHandler::new(state)
    }

    #[tokio::test]
    async fn test_nothing_due_on_empty_store() {
        let outcomes = handler().run(None).await.unwrap();
        assert!(outcomes.is_empty());

        let outcomes = handler().run(Some("main")).await.unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_database_is_rejected() {
        let result = handler().run(Some("archive")).await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }
}
