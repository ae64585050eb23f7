//! Exclusive lease handle and the `try_obtain_lease` helper.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::lease::{LeaseError, LeaseStore};

/// A lease on one key, identified by a token unique to this handle.
pub struct ExclusiveLease {
    store: Arc<dyn LeaseStore>,
    key: String,
    timeout: Duration,
    token: String,
}

impl ExclusiveLease {
    pub fn new(store: Arc<dyn LeaseStore>, key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            timeout,
            token: Uuid::new_v4().to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns `true` when this handle now holds the lease.
    pub async fn try_obtain(&self) -> Result<bool, LeaseError> {
        self.store
            .try_obtain(&self.key, &self.token, self.timeout)
            .await
    }

    /// Release early. A lease already taken over by another holder is left alone.
    pub async fn cancel(&self) -> Result<bool, LeaseError> {
        self.store.release(&self.key, &self.token).await
    }
}

/// Run `work` only if the lease on `key` could be obtained, then release it.
///
/// Returns `Ok(None)` when another holder has the key; that is the normal
/// "someone else is already running this" outcome. `timeout` bounds how long
/// the key stays locked if this process dies before releasing it.
pub async fn try_obtain_lease<F, T>(
    store: Arc<dyn LeaseStore>,
    key: &str,
    timeout: Duration,
    work: F,
) -> Result<Option<T>, LeaseError>
where
    F: Future<Output = T>,
{
    let lease = ExclusiveLease::new(store, key, timeout);
    if !lease.try_obtain().await? {
        tracing::debug!(lease_key = %key, "Lease held elsewhere, skipping");
        return Ok(None);
    }

    let output = work.await;

    match lease.cancel().await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(lease_key = %key, "Lease expired before the work finished"),
        Err(e) => tracing::warn!(lease_key = %key, error = %e, "Failed to release lease"),
    }

    Ok(Some(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::MemoryLeaseStore;

    #[tokio::test]
    async fn test_work_runs_only_when_lease_obtained() {
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
        let ttl = Duration::from_secs(60);

        let held = ExclusiveLease::new(store.clone(), "k", ttl);
        assert!(held.try_obtain().await.unwrap());

        let blocked = try_obtain_lease(store.clone(), "k", ttl, async { 1 }).await.unwrap();
        assert_eq!(blocked, None);
        assert_eq!(store.holder("k").await.unwrap(), Some(held.token().to_string()));
    }

    #[tokio::test]
    async fn test_lease_is_released_after_work() {
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
        let ttl = Duration::from_secs(60);

        let first = try_obtain_lease(store.clone(), "k", ttl, async { 1 }).await.unwrap();
        assert_eq!(first, Some(1));
        assert_eq!(store.holder("k").await.unwrap(), None);

        let second = try_obtain_lease(store.clone(), "k", ttl, async { 2 }).await.unwrap();
        assert_eq!(second, Some(2));
    }

    #[tokio::test]
    async fn test_cancel_frees_the_key() {
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
        let lease = ExclusiveLease::new(store.clone(), "k", Duration::from_secs(60));

        assert!(lease.try_obtain().await.unwrap());
        assert!(lease.cancel().await.unwrap());

        let other = ExclusiveLease::new(store, "k", Duration::from_secs(60));
        assert!(other.try_obtain().await.unwrap());
        assert_ne!(lease.token(), other.token());
    }

    #[tokio::test]
    async fn test_same_handle_cannot_reenter() {
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
        let lease = ExclusiveLease::new(store, "k", Duration::from_secs(60));

        assert!(lease.try_obtain().await.unwrap());
        assert!(!lease.try_obtain().await.unwrap());
    }
}
