//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Top-level application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Blob storage backend.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store backend.
    #[serde(default)]
    pub metadata: MetadataConfig,
}

impl AppConfig {
    /// Create a test configuration rooted at a temp directory.
    ///
    /// **For testing only.**
    pub fn for_testing(root: &std::path::Path) -> Self {
        Self {
            server: ServerConfig {
                session_idle_timeout_secs: 60,
                sweep_interval_secs: 5,
                ..Default::default()
            },
            storage: StorageConfig::Filesystem {
                path: root.join("storage"),
            },
            metadata: MetadataConfig::Sqlite {
                path: root.join("metadata.db"),
                query_timeout_secs: None,
            },
        }
    }
}

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Maximum chunk count a session may declare.
    #[serde(default = "default_max_chunk_count")]
    pub max_chunk_count: u32,
    /// Maximum size of a single chunk in bytes.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// Idle timeout after which an open session is reclaimed, in seconds.
    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,
    /// Interval between idle-session sweeps, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Extensions rejected before any storage I/O (lowercase, no dot).
    #[serde(default = "default_denied_extensions")]
    pub denied_extensions: Vec<String>,
    /// Lifetime of presigned download/upload URLs, in seconds.
    #[serde(default = "default_presign_ttl_secs")]
    pub presign_ttl_secs: u64,
}

impl ServerConfig {
    /// Get the session idle timeout as a Duration.
    pub fn session_idle_timeout(&self) -> Duration {
        let secs = i64::try_from(self.session_idle_timeout_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Check whether an extension is denied by policy.
    pub fn is_extension_denied(&self, extension: &str) -> bool {
        let ext = extension.to_ascii_lowercase();
        self.denied_extensions.iter().any(|d| d == &ext)
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_file_size() -> u64 {
    crate::DEFAULT_MAX_FILE_SIZE
}

fn default_max_chunk_count() -> u32 {
    crate::MAX_CHUNK_COUNT
}

fn default_max_chunk_size() -> u64 {
    crate::MAX_CHUNK_SIZE
}

fn default_session_idle_timeout_secs() -> u64 {
    3600 // 1 hour
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_denied_extensions() -> Vec<String> {
    ["exe", "dll", "bat", "cmd", "scr", "msi"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_presign_ttl_secs() -> u64 {
    600 // 10 minutes
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_file_size: default_max_file_size(),
            max_chunk_count: default_max_chunk_count(),
            max_chunk_size: default_max_chunk_size(),
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            denied_extensions: default_denied_extensions(),
            presign_ttl_secs: default_presign_ttl_secs(),
        }
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the ambient credential chain if not set.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to the ambient credential chain if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs. Required for MinIO and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl StorageConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Filesystem { path } => {
                if path.as_os_str().is_empty() {
                    return Err("filesystem storage path must not be empty".to_string());
                }
                Ok(())
            }
            Self::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.is_empty() {
                    return Err("s3 bucket must not be empty".to_string());
                }
                if access_key_id.is_some() ^ secret_access_key.is_some() {
                    return Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    );
                }
                Ok(())
            }
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite-backed store.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Advisory query timeout in seconds.
        query_timeout_secs: Option<u64>,
    },
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: None,
        }
    }
}
