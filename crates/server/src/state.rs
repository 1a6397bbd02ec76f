//! Application state shared across handlers.

use crate::index::SearchIndex;
use crate::ingest::IngestionCoordinator;
use crate::sessions::SessionStore;
use depot_core::config::AppConfig;
use depot_metadata::MetadataStore;
use depot_storage::BlobStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Blob storage backend.
    pub storage: Arc<dyn BlobStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// In-flight upload sessions.
    pub sessions: Arc<dyn SessionStore>,
    /// Ingestion coordinator.
    pub ingest: Arc<IngestionCoordinator>,
    /// Search index sink.
    pub index: Arc<dyn SearchIndex>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        sessions: Arc<dyn SessionStore>,
        index: Arc<dyn SearchIndex>,
    ) -> Self {
        let config = Arc::new(config);
        let ingest = Arc::new(IngestionCoordinator::new(
            config.clone(),
            storage.clone(),
            metadata.clone(),
            index.clone(),
        ));

        Self {
            config,
            storage,
            metadata,
            sessions,
            ingest,
            index,
        }
    }
}
