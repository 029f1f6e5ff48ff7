//! Error types for push token registration.

use thiserror::Error;
use tokensync_runtime::Interrupted;
use tokensync_store::StoreError;

/// Errors surfaced by the registration workflow.
///
/// Transient network and server failures never show up here; they are retried.
#[derive(Debug, Error)]
pub enum PushError {
    /// Persisted registration info is not a JSON object.
    #[error("Corrupted registration info: {0}")]
    CorruptedState(String),

    /// Store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A newer update superseded this one.
    #[error("Registration interrupted: {0}")]
    Interrupted(#[from] Interrupted),
}

/// Errors of a single HTTP registration attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The cancellation signal fired before a response arrived.
    #[error("Request aborted")]
    Aborted,

    /// The request could not be completed.
    #[error("Network error: {0}")]
    Network(String),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Result type for workflow operations.
pub type PushResult<T> = Result<T, PushError>;
