//! Error types for the record store.

use recset_backend::BackendError;
use thiserror::Error;

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing or malformed id, or a malformed query.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Update/delete/restore target does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Missing or unusable backend configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend failure, passed through uninterpreted.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Record could not be converted to or from JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for record store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
