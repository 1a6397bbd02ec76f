//! Server test utilities.

use depot_core::config::AppConfig;
use depot_metadata::{MetadataStore, SqliteStore};
use depot_server::{AppState, InMemorySessionStore, LoggingIndex, create_router};
use depot_storage::{BlobStore, FilesystemBackend};
use std::sync::Arc;
use tempfile::TempDir;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub index: Arc<LoggingIndex>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        let storage: Arc<dyn BlobStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path, None)
                .await
                .expect("Failed to create metadata store"),
        );

        let sessions = Arc::new(InMemorySessionStore::new());
        let index = Arc::new(LoggingIndex::new());

        let mut config = AppConfig::for_testing(temp_dir.path());
        modifier(&mut config);

        let state = AppState::new(config, storage, metadata, sessions, index.clone());
        let router = create_router(state.clone());

        Self {
            router,
            state,
            index,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Get access to the underlying blob storage.
    pub fn storage(&self) -> Arc<dyn BlobStore> {
        self.state.storage.clone()
    }
}
