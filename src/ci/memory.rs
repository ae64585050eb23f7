//! In-memory build store.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::{Mutex, RwLock};

use crate::ci::{Build, BuildStore, FailureReason, StaleSelection, TransitionError};
use crate::error::{AppError, AppResult};

/// Build store holding rows in a map keyed by id.
///
/// Mirrors the Postgres store's optimistic locking: `drop_build` only
/// applies when the caller's `lock_version` matches the stored one.
#[derive(Debug, Default)]
pub struct InMemoryBuildStore {
    builds: RwLock<BTreeMap<i64, Build>>,
    pending_writes: Mutex<HashMap<i64, u32>>,
    broken_drops: Mutex<HashSet<i64>>,
    broken_dooms: Mutex<HashSet<i64>>,
}

impl InMemoryBuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, build: Build) {
        self.builds.write().await.insert(build.id, build);
    }

    pub async fn get(&self, id: i64) -> Option<Build> {
        self.builds.read().await.get(&id).cloned()
    }

    pub async fn all(&self) -> Vec<Build> {
        self.builds.read().await.values().cloned().collect()
    }

    /// Make the next `writes` drop attempts on `id` lose a race against
    /// another writer that bumps the lock version first.
    pub async fn simulate_concurrent_writes(&self, id: i64, writes: u32) {
        self.pending_writes.lock().await.insert(id, writes);
    }

    /// Make every `drop_build` on `id` fail with a storage error.
    pub async fn simulate_store_error(&self, id: i64) {
        self.broken_drops.lock().await.insert(id);
    }

    /// Make every `doom` on `id` fail with a storage error.
    pub async fn fail_doom(&self, id: i64) {
        self.broken_dooms.lock().await.insert(id);
    }

    fn storage_error(operation: &str, id: i64) -> TransitionError {
        TransitionError::Store(AppError::Internal {
            source: anyhow::anyhow!("{} failed for build {}", operation, id),
        })
    }

    async fn take_concurrent_write(&self, id: i64) -> bool {
        let mut pending = self.pending_writes.lock().await;
        match pending.get_mut(&id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl BuildStore for InMemoryBuildStore {
    async fn find_stale(&self, selection: &StaleSelection, limit: i64) -> AppResult<Vec<Build>> {
        let builds = self.builds.read().await;
        let mut page: Vec<Build> = builds
            .values()
            .filter(|build| selection.matches(build))
            .cloned()
            .collect();

        page.sort_by_key(|build| (build.created_at, build.project_id, build.id));
        page.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(page)
    }

    async fn reload(&self, id: i64) -> AppResult<Option<Build>> {
        Ok(self.get(id).await)
    }

    async fn drop_build(
        &self,
        build: &Build,
        reason: FailureReason,
        now: NaiveDateTime,
    ) -> Result<Build, TransitionError> {
        if build.is_terminal() {
            return Ok(build.clone());
        }

        if self.broken_drops.lock().await.contains(&build.id) {
            return Err(Self::storage_error("drop", build.id));
        }

        let interfering = self.take_concurrent_write(build.id).await;
        let mut builds = self.builds.write().await;
        let stored = builds
            .get_mut(&build.id)
            .ok_or(TransitionError::NotFound(build.id))?;

        if interfering {
            stored.lock_version += 1;
        }

        if stored.lock_version != build.lock_version {
            return Err(TransitionError::Conflict {
                build_id: build.id,
                expected: build.lock_version,
            });
        }

        stored.mark_failed(reason, now);
        Ok(stored.clone())
    }

    async fn doom(&self, build: &Build, now: NaiveDateTime) -> Result<Build, TransitionError> {
        if self.broken_dooms.lock().await.contains(&build.id) {
            return Err(Self::storage_error("doom", build.id));
        }

        let mut builds = self.builds.write().await;
        let stored = builds
            .get_mut(&build.id)
            .ok_or(TransitionError::NotFound(build.id))?;

        stored.mark_failed(FailureReason::DataIntegrityFailure, now);
        Ok(stored.clone())
    }
}
