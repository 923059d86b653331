//! Error types for the sync layer.

use crate::operation::OperationKind;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in the operation pipeline.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Two executors declared the same operation kind.
    #[error("executor {incoming} conflicts with {existing} on operation kind {kind}")]
    CapabilityConflict {
        kind: OperationKind,
        existing: &'static str,
        incoming: &'static str,
    },

    /// Network or server-side failure worth retrying.
    #[error("retryable remote failure: {0}")]
    RetryableRemoteFailure(String),

    /// The backend rejected the operation; retrying cannot help.
    #[error("terminal remote failure: {0}")]
    TerminalRemoteFailure(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] usersync_storage::StorageError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The repo was created outside a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,
}

impl SyncError {
    /// Returns true for failures that leave the operation queued.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryableRemoteFailure(_))
    }
}
