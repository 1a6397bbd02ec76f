//! File metadata store for Depot.
//!
//! Files and folders share one `files` table; folders are rows without a
//! blob pointer. The store is the authority on record state, blob reference
//! counts, and per-owner deduplication lookups.

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::FileRow;
pub use repos::{FileRepo, FolderRepo};
pub use store::{MetadataStore, SqliteStore};

use depot_core::config::MetadataConfig;
use std::sync::Arc;
use tracing::info;

/// Build a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            info!(path = %path.display(), "using sqlite metadata store");
            Ok(Arc::new(SqliteStore::new(path, *query_timeout_secs).await?))
        }
    }
}
