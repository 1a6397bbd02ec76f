//! Folder-specific repository operations.

use crate::error::MetadataResult;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for folder structure queries.
#[async_trait]
pub trait FolderRepo: Send + Sync {
    /// Whether the record exists, is active, and is a folder. Used to
    /// validate `parent_id` before inserts and moves.
    async fn is_active_folder(&self, file_id: Uuid) -> MetadataResult<bool>;

    /// Whether a folder has any active children. Guards permanent folder
    /// deletion.
    async fn has_active_children(&self, folder_id: Uuid) -> MetadataResult<bool>;

    /// Number of active children under a folder.
    async fn count_active_children(&self, folder_id: Uuid) -> MetadataResult<u64>;
}
