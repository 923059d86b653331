//! Core type definitions for usersync.
//!
//! This crate defines the small, dependency-light types shared by every
//! layer of the user state engine:
//! - Model keys and operation identifiers
//! - The closed property value type carried by models and change events
//! - Millisecond timestamps for operation creation time

mod ids;
mod timestamp;
mod value;

pub use ids::{ModelKey, OperationId};
pub use timestamp::Timestamp;
pub use value::PropertyValue;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid model key: {0}")]
    InvalidKey(String),
}
