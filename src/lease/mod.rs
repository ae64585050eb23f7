//! Lease module providing cross-process mutual exclusion with automatic expiry.
//!
//! A lease is a key held by one token for a bounded time. Backends:
//! - Memory lease store (in-process, single-node deployments and tests)
//! - Redis lease store (shared across every worker process)
//!
//! # Configuration
//!
//! ```toml
//! [lease]
//! backend = "redis"  # or "memory"
//!
//! [lease.redis]
//! url = "redis://127.0.0.1:6379"
//! pool_size = 4
//! connection_timeout = 5
//! key_prefix = "warden"
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let ran = try_obtain_lease(store, "my_key", Duration::from_secs(60), async {
//!     do_exclusive_work().await
//! })
//! .await?;
//! ```

mod error;
mod exclusive;
mod manager;
mod memory;
mod redis;
mod traits;

pub use error::LeaseError;
pub use exclusive::{ExclusiveLease, try_obtain_lease};
pub use manager::LeaseManager;
pub use memory::MemoryLeaseStore;
pub use redis::RedisLeaseStore;
pub use traits::LeaseStore;

// Re-export config types
pub use crate::config::settings::{LeaseBackend, LeaseConfig, RedisLeaseConfig};
