//! Lease manager that dispatches to the configured backend.

use std::sync::Arc;

use crate::config::settings::{LeaseBackend, LeaseConfig};
use crate::lease::memory::MemoryLeaseStore;
use crate::lease::redis::RedisLeaseStore;
use crate::lease::{LeaseError, LeaseStore};

/// Owns the lease store selected by `[lease].backend`.
#[derive(Clone)]
pub struct LeaseManager {
    store: Arc<dyn LeaseStore>,
    config: LeaseConfig,
}

impl LeaseManager {
    pub async fn new(config: LeaseConfig) -> Result<Self, LeaseError> {
        let store: Arc<dyn LeaseStore> = match config.backend {
            LeaseBackend::Memory => Arc::new(MemoryLeaseStore::new()),
            LeaseBackend::Redis => Arc::new(RedisLeaseStore::new(&config.redis).await?),
        };

        tracing::info!(backend = ?config.backend, "Lease store initialized");
        Ok(Self { store, config })
    }

    /// Wrap an existing store, e.g. a shared in-memory store in tests.
    pub fn with_store(store: Arc<dyn LeaseStore>, config: LeaseConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> Arc<dyn LeaseStore> {
        self.store.clone()
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_memory_backend_is_default() {
        let manager = LeaseManager::new(LeaseConfig::default()).await.unwrap();
        assert_eq!(manager.config().backend, LeaseBackend::Memory);

        let store = manager.store();
        assert!(store.try_obtain("k", "t", Duration::from_secs(1)).await.unwrap());
    }
}
