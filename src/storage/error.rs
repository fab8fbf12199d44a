//! Storage-specific error types.
//!
//! All record store operations return [`StorageError`] on failure, which can
//! be matched to determine the underlying cause.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed (sqlx error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A record with this token was already saved.
    #[error("record '{0}' already exists")]
    Conflict(String),

    /// Invalid data in database (e.g., out of range status code).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Internal error (e.g., unsupported configuration).
    #[error("internal error: {0}")]
    Internal(String),
}
