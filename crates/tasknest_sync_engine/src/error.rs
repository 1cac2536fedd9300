//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Local storage error during sync.
    #[error("storage error: {0}")]
    Storage(String),

    /// Payload could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A sync cycle is already in flight.
    #[error("sync already in progress")]
    SyncInProgress,

    /// No conflict with the given id is pending.
    #[error("unknown conflict: {0}")]
    UnknownConflict(String),

    /// A merge resolution was requested without merged data.
    #[error("merge resolution for conflict {0} requires data")]
    MissingMergeData(String),

    /// The proposed resolution does not match the conflict.
    #[error("resolution does not match conflict {0}")]
    InvalidResolution(String),

    /// Not connected to the remote.
    #[error("not connected to remote")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotConnected => true,
            _ => false,
        }
    }
}
