//! Lease error types.

use thiserror::Error;

/// Errors that can occur talking to a lease store.
///
/// Failing to obtain a lease because another holder has it is not an error;
/// `LeaseStore::try_obtain` reports that as `Ok(false)`.
#[derive(Error, Debug)]
pub enum LeaseError {
    #[error("Lease operation failed: {0}")]
    Operation(String),

    #[error("Lease store connection failed: {0}")]
    Connection(String),
}
