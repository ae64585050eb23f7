//! Leased batched background migration scheduler.
//!
//! The scheduler picks at most one overdue migration per table, capped at
//! `max_running_migrations`, and enqueues `(database_name, migration_id)`.
//! Each execution unit re-reads the migration, takes a lease keyed by
//! `(database, table)` and runs one batch only if the migration is still
//! active and its interval has elapsed.

mod dispatch;
mod execution;
mod jobs;
mod memory;
mod model;
mod repository;
mod runner;
mod scheduler;
mod store;

pub use dispatch::{ChannelDispatcher, Dispatcher, ExecutionRequest, InlineDispatcher};
pub use execution::{
    ExecutionOutcome, ExecutionWorker, MigrationDatabases, MigrationFeature, TrackingDatabase,
    lease_key,
};
pub use jobs::CopyColumnJob;
pub use memory::InMemoryMigrationStore;
pub use model::{BatchRange, BatchUpdate, BatchedMigration, MigrationStatus};
pub use repository::MigrationRepository;
pub use runner::{BatchOutcome, BatchedMigrationRunner, MigrationJob, MigrationJobRegistry};
pub use scheduler::BatchedMigrationScheduler;
pub use store::MigrationStore;
