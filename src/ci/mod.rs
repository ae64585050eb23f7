//! CI build and runner domain consumed by the stuck builds reaper.
//!
//! The reaper only needs three things from this layer: a paged stale-build
//! query, the guarded `drop`/`doom` transitions, and the live runner check
//! behind the `stuck?` predicate. Each has a Postgres implementation and an
//! in-memory one for single-node runs and tests.

mod build;
mod memory;
mod repository;
mod runner;
mod store;

pub use build::{Build, BuildStatus, FailureReason};
pub use memory::InMemoryBuildStore;
pub use repository::{BuildRepository, RunnerRepository};
pub use runner::{Runner, StaticRunnerAvailability};
pub use store::{BuildStore, RunnerAvailability, StaleCondition, StaleSelection, TransitionError};
