//! LeaseStore trait definition.

use std::time::Duration;

use async_trait::async_trait;

use crate::lease::LeaseError;

/// Trait for lease store operations.
///
/// All lease backends must provide atomic set-if-absent-with-TTL semantics:
/// at most one token holds a key at a time, and the key frees itself once
/// the TTL passes even if the holder crashed.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Try to take `key` for `token` during `ttl`. Returns `false` when the key
    /// is held by someone else.
    async fn try_obtain(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LeaseError>;

    /// Release `key` only if it is still held by `token`.
    async fn release(&self, key: &str, token: &str) -> Result<bool, LeaseError>;

    /// Current holder token of `key`, if any.
    async fn holder(&self, key: &str) -> Result<Option<String>, LeaseError>;
}
