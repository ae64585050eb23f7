//! Hand-off from the scheduler to execution units.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::background_migration::{ExecutionOutcome, ExecutionWorker};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub database_name: String,
    pub migration_id: i64,
}

/// Fire-and-forget enqueue. Delivery may repeat; execution units re-check
/// the migration before touching it.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn enqueue(&self, request: ExecutionRequest) -> AppResult<()>;
}

/// Unbounded queue drained by a background task that spawns one execution
/// unit per request.
#[derive(Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::UnboundedSender<ExecutionRequest>,
}

impl ChannelDispatcher {
    pub fn spawn(worker: Arc<ExecutionWorker>, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ExecutionRequest>();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    request = receiver.recv() => {
                        let Some(request) = request else { break };
                        let worker = worker.clone();
                        tokio::spawn(async move {
                            execute_request(&worker, &request).await;
                        });
                    }
                }
            }
            tracing::debug!("Execution dispatcher stopped");
        });

        (Self { sender }, handle)
    }
}

#[async_trait]
impl Dispatcher for ChannelDispatcher {
    async fn enqueue(&self, request: ExecutionRequest) -> AppResult<()> {
        self.sender.send(request).map_err(|e| AppError::Internal {
            source: anyhow::anyhow!(
                "execution queue closed, dropped migration {} on {}",
                e.0.migration_id,
                e.0.database_name
            ),
        })
    }
}

/// Runs each request to completion before `enqueue` returns and keeps the
/// outcomes. Used by one-shot CLI runs.
pub struct InlineDispatcher {
    worker: Arc<ExecutionWorker>,
    outcomes: Mutex<Vec<(ExecutionRequest, ExecutionOutcome)>>,
}

impl InlineDispatcher {
    pub fn new(worker: Arc<ExecutionWorker>) -> Self {
        Self {
            worker,
            outcomes: Mutex::new(Vec::new()),
        }
    }

    pub async fn take_outcomes(&self) -> Vec<(ExecutionRequest, ExecutionOutcome)> {
        std::mem::take(&mut *self.outcomes.lock().await)
    }
}

#[async_trait]
impl Dispatcher for InlineDispatcher {
    async fn enqueue(&self, request: ExecutionRequest) -> AppResult<()> {
        let outcome = self
            .worker
            .perform(&request.database_name, request.migration_id)
            .await?;
        self.outcomes.lock().await.push((request, outcome));
        Ok(())
    }
}

async fn execute_request(worker: &ExecutionWorker, request: &ExecutionRequest) {
    match worker.perform(&request.database_name, request.migration_id).await {
        Ok(outcome) => tracing::info!(
            database_name = %request.database_name,
            migration_id = request.migration_id,
            outcome = ?outcome,
            "Migration execution finished"
        ),
        Err(e) => tracing::error!(
            database_name = %request.database_name,
            migration_id = request.migration_id,
            error = %e,
            "Migration execution failed"
        ),
    }
}
