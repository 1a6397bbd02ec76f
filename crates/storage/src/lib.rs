//! Blob storage gateway for Depot.
//!
//! Defines the [`BlobStore`] trait and its backends: local filesystem and
//! S3-compatible object storage. Backend selection happens once at startup
//! via [`from_config`]; the rest of the system only sees the trait object.

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{FilesystemBackend, S3Backend};
pub use error::{StorageError, StorageResult};
pub use traits::{BlobStore, ByteStream, ObjectMeta, PresignMethod};

use depot_core::config::StorageConfig;
use std::sync::Arc;
use tracing::info;

/// Build a storage backend from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            info!(path = %path.display(), "using filesystem storage backend");
            Ok(Arc::new(FilesystemBackend::new(path).await?))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            info!(%bucket, "using s3 storage backend");
            Ok(Arc::new(
                S3Backend::new(
                    bucket,
                    endpoint.clone(),
                    region.clone(),
                    prefix.clone(),
                    access_key_id.clone(),
                    secret_access_key.clone(),
                    *force_path_style,
                )
                .await?,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn filesystem_config_builds_backend() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().to_path_buf(),
        };
        let store = from_config(&config).await.unwrap();
        assert_eq!(store.backend_name(), "filesystem");
    }

    #[tokio::test]
    async fn invalid_s3_config_rejected() {
        let config = StorageConfig::S3 {
            bucket: "b".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("key".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };
        let err = from_config(&config).await.unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }
}
