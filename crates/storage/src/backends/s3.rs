//! S3-compatible storage backend using the AWS SDK.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobStore, ByteStream, ObjectMeta, PresignMethod};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream as SdkByteStream;
use bytes::Bytes;
use futures::StreamExt;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::instrument;

/// Maximum range size for get_range operations (128 MiB).
const MAX_RANGE_SIZE: u64 = 128 * 1024 * 1024;

/// S3-compatible object store.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

fn map_sdk_error<E>(err: aws_sdk_s3::error::SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    match &err {
        aws_sdk_s3::error::SdkError::TimeoutError(_)
        | aws_sdk_s3::error::SdkError::DispatchFailure(_) => {
            StorageError::Unavailable(err.to_string())
        }
        _ => StorageError::S3(Box::new(err)),
    }
}

fn is_missing_key(err: &aws_sdk_s3::operation::get_object::GetObjectError) -> bool {
    matches!(
        err,
        aws_sdk_s3::operation::get_object::GetObjectError::NoSuchKey(_)
    )
}

/// Map a GetObject failure, distinguishing a vanished key from backend
/// trouble. Every read path must use this so a missing blob is a 404
/// everywhere, ranged reads included.
fn map_get_error(
    err: aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::get_object::GetObjectError>,
    key: &str,
) -> StorageError {
    if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = err {
        if is_missing_key(service_err.err()) {
            return StorageError::NotFound(key.to_string());
        }
    }
    map_sdk_error(err)
}

impl S3Backend {
    /// Create a new S3 backend.
    ///
    /// Explicit credentials take precedence; otherwise the ambient AWS
    /// credential chain (env vars, profile, IAM role) is used.
    pub async fn new(
        bucket: &str,
        endpoint: Option<String>,
        region: Option<String>,
        prefix: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        force_path_style: bool,
    ) -> StorageResult<Self> {
        if access_key_id.is_some() ^ secret_access_key.is_some() {
            return Err(StorageError::Config(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ));
        }

        let resolved_region = region.unwrap_or_else(|| "us-east-1".to_string());
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(resolved_region));

        if let (Some(key_id), Some(secret)) = (access_key_id, secret_access_key) {
            let credentials = aws_credential_types::Credentials::new(
                key_id,
                secret,
                None, // session token
                None, // expiration
                "depot-config",
            );
            loader = loader.credentials_provider(credentials);
        }

        let shared_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);

        if let Some(endpoint_url) = endpoint {
            // Handle bare host:port endpoints (e.g. "minio:9000").
            let lower = endpoint_url.to_ascii_lowercase();
            let normalized = if lower.starts_with("http://") || lower.starts_with("https://") {
                endpoint_url
            } else {
                format!("http://{endpoint_url}")
            };
            builder = builder.endpoint_url(normalized);
        }

        if force_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
            prefix,
        })
    }

    /// Apply the configured key prefix.
    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
            None => key.to_string(),
        }
    }

    fn presign_config(ttl: Duration) -> StorageResult<PresigningConfig> {
        PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::Config(format!("invalid presign ttl: {e}")))
    }
}

#[async_trait]
impl BlobStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = e {
                    if service_err.err().is_not_found() {
                        return Ok(false);
                    }
                }
                Err(map_sdk_error(e))
            }
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let resp = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| {
                if let aws_sdk_s3::error::SdkError::ServiceError(ref service_err) = e {
                    if service_err.err().is_not_found() {
                        return StorageError::NotFound(key.to_string());
                    }
                }
                map_sdk_error(e)
            })?;

        Ok(ObjectMeta {
            size: resp.content_length().unwrap_or(0).max(0) as u64,
            last_modified: resp
                .last_modified()
                .and_then(|t| time::OffsetDateTime::from_unix_timestamp(t.secs()).ok()),
            content_type: resp.content_type().map(str::to_string),
        })
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| map_get_error(e, key))?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Unavailable(format!("body read failed: {e}")))?;
        Ok(data.into_bytes())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| map_get_error(e, key))?;

        // The SDK body is not a futures Stream; bridge it through AsyncRead.
        let reader = resp.body.into_async_read();
        let stream = ReaderStream::new(reader).map(|chunk| chunk.map_err(StorageError::Io));
        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get_range(&self, key: &str, start: u64, end: u64) -> StorageResult<Bytes> {
        if end < start {
            return Err(StorageError::InvalidRange(format!(
                "end ({end}) < start ({start})"
            )));
        }
        if end - start > MAX_RANGE_SIZE {
            return Err(StorageError::InvalidRange(format!(
                "range size {} exceeds maximum {MAX_RANGE_SIZE} bytes",
                end - start
            )));
        }

        // HTTP ranges are inclusive; ours are half-open.
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .range(format!("bytes={}-{}", start, end.saturating_sub(1)))
            .send()
            .await
            .map_err(|e| map_get_error(e, key))?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Unavailable(format!("body read failed: {e}")))?;
        Ok(data.into_bytes())
    }

    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .content_type(content_type)
            .body(SdkByteStream::from(data))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let existed = self.exists(key).await?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(existed)
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn copy(&self, from: &str, to: &str) -> StorageResult<()> {
        let encoded_source = utf8_percent_encode(
            &format!("{}/{}", self.bucket, self.full_key(from)),
            NON_ALPHANUMERIC,
        )
        .to_string();

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(encoded_source)
            .key(self.full_key(to))
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn presign(
        &self,
        key: &str,
        method: PresignMethod,
        ttl: Duration,
    ) -> StorageResult<String> {
        let config = Self::presign_config(ttl)?;
        let uri = match method {
            PresignMethod::Get => self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(self.full_key(key))
                .presigned(config)
                .await
                .map_err(map_sdk_error)?
                .uri()
                .to_string(),
            PresignMethod::Put => self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(self.full_key(key))
                .presigned(config)
                .await
                .map_err(map_sdk_error)?
                .uri()
                .to_string(),
        };
        Ok(uri)
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(map_sdk_error)?;
        Ok(())
    }
}
