//! Long-running maintenance service
//!
//! Starts the cron runner and the execution dispatcher, then waits for a
//! shutdown signal and stops both.

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::background_migration::ChannelDispatcher;
use crate::config::settings::LeaseBackend;
use crate::error::AppResult;
use crate::jobs::JobScheduler;
use crate::state::AppState;

/// Cron-driven maintenance service
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Run until Ctrl+C or SIGTERM.
    pub async fn run(self) -> AppResult<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        let settings = &self.state.settings;
        tracing::info!(
            app_name = %settings.application.name,
            app_version = %settings.application.version,
            environment = %settings.application.environment,
            lease_backend = ?settings.lease.backend,
            "Service starting"
        );
        if settings.application.environment.is_deployed()
            && settings.lease.backend == LeaseBackend::Memory
        {
            tracing::warn!(
                "In-process leases only exclude work inside this process; use the redis backend when running more than one warden"
            );
        }

        let token = CancellationToken::new();
        let (dispatcher, dispatch_handle) =
            ChannelDispatcher::spawn(Arc::clone(&self.state.execution_worker), token.clone());
        let registry = self.state.build_registry(Arc::new(dispatcher))?;

        let scheduler = if settings.jobs.enabled {
            let scheduler =
                JobScheduler::new(registry, Arc::clone(&self.state.leases), token.clone()).await?;
            scheduler.start().await?;
            Some(scheduler)
        } else {
            tracing::warn!("Job scheduling disabled, nothing will run until shutdown");
            None
        };

        shutdown.await;

        if let Some(scheduler) = scheduler {
            scheduler.stop().await?;
        }
        token.cancel();
        if let Err(e) = dispatch_handle.await {
            tracing::warn!(error = %e, "Execution dispatcher task ended abnormally");
        }

        tracing::info!("Service shutdown complete");
        Ok(())
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
