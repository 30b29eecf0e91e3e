//! Backend errors.

use thiserror::Error;

/// A failed backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("sqlite: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored value is not valid JSON, or a value could not be encoded.
    #[error("json: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Patch target does not exist.
    #[error("no such key: {0}")]
    NotFound(String),

    /// Document operation on an ordered set, or the reverse.
    #[error("key {0} holds a value of another type")]
    WrongType(String),

    /// Malformed request (patch path, scan cursor) or stored value.
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("schema migration failed: {0}")]
    Migration(String),

    /// Backend unreachable, poisoned, or refusing writes.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;
