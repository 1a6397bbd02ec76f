//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::time::Duration;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
    /// Content type (if available).
    pub content_type: Option<String>,
}

/// HTTP method a presigned URL authorizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresignMethod {
    /// Time-limited download.
    Get,
    /// Time-limited direct client upload.
    Put,
}

/// Object store abstraction over blob backends.
///
/// The ingestion coordinator writes every blob under a freshly generated key,
/// so `put` overwrite semantics are never exercised by it. All other
/// operations are idempotent.
#[async_trait]
pub trait BlobStore: std::fmt::Debug + Send + Sync + 'static {
    /// Check if an object exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get an object's metadata without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// Get an object's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Get an object as a byte stream.
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Get a half-open byte range `[start, end)` from an object.
    async fn get_range(&self, key: &str, start: u64, end: u64) -> StorageResult<Bytes>;

    /// Put an object atomically with its content type.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Delete an object. Returns `true` if the object existed.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Copy an object to a new key.
    async fn copy(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Create a time-limited presigned URL for direct client transfer.
    ///
    /// Backends without a presigning facility return
    /// [`StorageError::Unsupported`](crate::StorageError::Unsupported).
    async fn presign(&self, key: &str, method: PresignMethod, ttl: Duration)
        -> StorageResult<String>;

    /// Get the name of this storage backend ("s3", "filesystem").
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called during server startup so misconfiguration surfaces before the
    /// first request rather than on it.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
