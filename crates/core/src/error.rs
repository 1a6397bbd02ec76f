//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("chunk index {index} out of range (session declares {total_chunks} chunks)")]
    ChunkIndexOutOfRange { index: u32, total_chunks: u32 },

    #[error("assembled size mismatch: declared {declared} bytes, assembled {assembled}")]
    SizeMismatch { declared: u64, assembled: u64 },

    #[error("upload session error: {0}")]
    UploadSession(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
