//! Memory lease store implementation using DashMap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use crate::lease::{LeaseError, LeaseStore};

#[derive(Debug, Clone)]
struct LeaseEntry {
    token: String,
    expires_at: Instant,
}

/// Acquisitions between two sweeps of expired entries.
const SWEEP_EVERY: u64 = 64;

/// In-process lease store.
///
/// Only excludes holders inside one process. Expiry uses tokio's clock so
/// paused-time tests can advance past a TTL. Expired entries are swept every
/// `SWEEP_EVERY` acquisitions, so keys nobody asks for again do not pile up.
#[derive(Debug, Default)]
pub struct MemoryLeaseStore {
    leases: DashMap<String, LeaseEntry>,
    acquisitions: AtomicU64,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.leases.retain(|_, lease| lease.expires_at > now);
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn try_obtain(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LeaseError> {
        if self.acquisitions.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.purge_expired();
        }

        let now = Instant::now();
        let lease = LeaseEntry {
            token: token.to_string(),
            expires_at: now + ttl,
        };

        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at <= now {
                    occupied.insert(lease);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(lease);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool, LeaseError> {
        Ok(self
            .leases
            .remove_if(key, |_, lease| lease.token == token)
            .is_some())
    }

    async fn holder(&self, key: &str) -> Result<Option<String>, LeaseError> {
        let now = Instant::now();
        let token = match self.leases.get(key) {
            Some(lease) if lease.expires_at > now => return Ok(Some(lease.token.clone())),
            Some(lease) => lease.token.clone(),
            None => return Ok(None),
        };

        self.leases
            .remove_if(key, |_, lease| lease.token == token && lease.expires_at <= now);
        Ok(None)
    }
}
