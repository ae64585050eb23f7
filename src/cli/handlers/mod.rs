//! Command handlers for CLI operations
//!
//! This module contains handlers for different CLI commands,
//! separating command execution logic from parsing and validation.

pub mod migrate;
pub mod reap;
pub mod schedule;
pub mod serve;

pub use migrate::MigrateCommandHandler;
pub use reap::ReapCommandHandler;
pub use schedule::ScheduleMigrationsCommandHandler;
pub use serve::ServeCommandHandler;
