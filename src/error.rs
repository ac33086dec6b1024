//! Sync error types

use thiserror::Error;

/// Error type for the order synchronization layer
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level connection failure
    #[error("connection error: {0}")]
    Connection(String),

    /// HTTP request failed (polling path)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Received a frame that could not be decoded
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
