//! Warden-RS Library
//!
//! Background maintenance for a CI platform: the stuck builds reaper and the
//! leased batched background migration scheduler, driven by a cron runner.

use shadow_rs::shadow;
shadow!(build);

pub mod background_migration;
pub mod ci;
pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod lease;
pub mod logger;
pub mod reaper;
pub mod schema;
pub mod server;
pub mod state;

pub use state::AppState;

pub fn pkg_version() -> &'static str {
    build::PKG_VERSION
}

pub fn clap_long_version() -> &'static str {
    build::CLAP_LONG_VERSION
}
