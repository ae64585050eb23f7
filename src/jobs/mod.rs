//! Cron runner.
//!
//! Jobs are listed in an explicit `JobRegistry` (name, cron cadence, dedup
//! key, retry policy, timeout) built at startup and handed to
//! `JobScheduler`. There is no global registration.

pub mod error;
pub mod executor;
pub mod registry;
pub mod scheduler;
pub mod types;

pub use error::{JobError, JobResult};
pub use executor::JobExecutor;
pub use registry::{CronEntry, JobRegistry, RegisteredJob, RetryPolicy, validate_cron_expression};
pub use scheduler::JobScheduler;
pub use types::{JobContext, JobStatus, JobTask};
