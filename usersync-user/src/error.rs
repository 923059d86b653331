//! Error types for the user layer.

use thiserror::Error;

/// Result type for user-facing operations.
pub type UserResult<T> = Result<T, UserError>;

/// Errors surfaced by the user manager and the user handle.
///
/// Remote failures never appear here: they are retried or reported to the
/// repo observer.
#[derive(Debug, Error)]
pub enum UserError {
    /// No session has been established yet.
    #[error("no active user")]
    NoActiveUser,

    /// The cached identity and properties do not form a pair. Recovered
    /// internally by starting a fresh guest session.
    #[error("corrupted cache: {0}")]
    CorruptedCache(String),

    /// Malformed local input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] usersync_storage::StorageError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] usersync_sync::SyncError),

    /// Invalid configuration document.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}
