mod app_error;
mod database_converter;
mod tracking;

pub use app_error::{AppError, AppResult};
pub use database_converter::DatabaseErrorConverter;
pub use tracking::{ErrorTracker, LogErrorTracker};
