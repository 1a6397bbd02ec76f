//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
///
/// `NotFound` is non-retryable; `Unavailable` marks transient backend faults
/// the caller may retry. Everything else is a caller or configuration bug.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation not supported by backend {backend}: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },
}

impl StorageError {
    /// Whether a retry of the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_) | Self::S3(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
