//! Error types for the storage layer.

use thiserror::Error;
use usersync_types::ModelKey;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A model with this key is already in the store.
    #[error("duplicate key in store {store}: {key}")]
    DuplicateKey { store: String, key: ModelKey },

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid data read back from the cache.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The persistence backend is unavailable.
    #[error("persistence unavailable: {0}")]
    Unavailable(String),
}
