//! Search index propagation.
//!
//! Index updates are best-effort: a failure never rolls back a committed
//! file, it only surfaces in the logs for later reconciliation.

use async_trait::async_trait;
use depot_metadata::FileRow;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use uuid::Uuid;

/// Downstream search index receiving file metadata after commit.
#[async_trait]
pub trait SearchIndex: Send + Sync + 'static {
    /// Propagate a newly committed or updated record.
    async fn index_file(&self, file: &FileRow) -> Result<(), String>;

    /// Remove a record from the index.
    async fn remove_file(&self, file_id: Uuid) -> Result<(), String>;
}

/// Index sink that only records the propagation in the logs.
///
/// Stands in until a real search cluster is wired up; the counters let
/// tests assert that propagation happened without coupling to a backend.
#[derive(Default)]
pub struct LoggingIndex {
    indexed: AtomicU64,
    removed: AtomicU64,
}

impl LoggingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indexed_count(&self) -> u64 {
        self.indexed.load(Ordering::Relaxed)
    }

    pub fn removed_count(&self) -> u64 {
        self.removed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SearchIndex for LoggingIndex {
    async fn index_file(&self, file: &FileRow) -> Result<(), String> {
        self.indexed.fetch_add(1, Ordering::Relaxed);
        debug!(file_id = %file.file_id, name = %file.display_name, "indexed file");
        Ok(())
    }

    async fn remove_file(&self, file_id: Uuid) -> Result<(), String> {
        self.removed.fetch_add(1, Ordering::Relaxed);
        debug!(%file_id, "removed file from index");
        Ok(())
    }
}
