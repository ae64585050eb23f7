//! Stuck builds reaper.
//!
//! Forces builds stuck in `scheduled`, `pending`, `running` or `canceling`
//! past a per-state timeout into `failed`. Every state runs through the same
//! `StuckBuildsReaper::execute`, parameterised by a `DropPolicy` entry.

mod policy;
mod retry;
mod service;
mod worker;

pub use policy::{DropPolicy, POLICY_NAMES, StuckType, policies_from_config};
pub use retry::{Attempt, OptimisticRetry, RetryOutcome};
pub use service::{ReapSummary, StuckBuildsReaper};
pub use worker::{EXCLUSIVE_LEASE_KEY, StuckBuildsWorker};
