//! Store errors.

use thiserror::Error;

/// Store error types.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Installation id that cannot be used as a storage key.
    #[error("Invalid installation id: {0:?}")]
    InvalidKey(String),
}
