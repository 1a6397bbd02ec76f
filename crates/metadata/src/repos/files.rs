//! File record repository.

use crate::error::MetadataResult;
use crate::models::FileRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for file records.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Insert a new file record.
    ///
    /// A sibling-name collision (active folder with the same display name
    /// under the same parent) surfaces as
    /// [`MetadataError::Constraint`](crate::MetadataError::Constraint).
    async fn insert_file(&self, file: &FileRow) -> MetadataResult<()>;

    /// Get a file record by id.
    async fn get_file(&self, file_id: Uuid) -> MetadataResult<Option<FileRow>>;

    /// Find the most recent active record of this owner with the given
    /// content fingerprint. Trashed records never match, so re-uploading
    /// trashed content stores a fresh blob.
    async fn find_active_by_fingerprint(
        &self,
        owner_id: Uuid,
        fingerprint: &str,
    ) -> MetadataResult<Option<FileRow>>;

    /// Count records (any status) pointing at the given blob.
    async fn count_blob_references(&self, bucket: &str, object_key: &str) -> MetadataResult<u64>;

    /// List active children of a folder. `parent_id = None` lists the
    /// owner's root.
    async fn list_children(
        &self,
        owner_id: Uuid,
        parent_id: Option<Uuid>,
    ) -> MetadataResult<Vec<FileRow>>;

    /// Move a record to `status = trashed`.
    async fn trash_file(&self, file_id: Uuid, updated_at: OffsetDateTime) -> MetadataResult<()>;

    /// Move a trashed record back to `status = active`.
    async fn restore_file(&self, file_id: Uuid, updated_at: OffsetDateTime) -> MetadataResult<()>;

    /// Permanently delete a record. Returns the deleted row so the caller
    /// can decide whether its blob is still referenced.
    async fn delete_file(&self, file_id: Uuid) -> MetadataResult<FileRow>;

    /// Rename a record.
    async fn rename_file(
        &self,
        file_id: Uuid,
        display_name: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Re-parent a record. `new_parent_id = None` moves it to the root.
    async fn move_file(
        &self,
        file_id: Uuid,
        new_parent_id: Option<Uuid>,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Bump the download counter.
    async fn increment_download_count(&self, file_id: Uuid) -> MetadataResult<()>;

    /// Bump the preview counter.
    async fn increment_preview_count(&self, file_id: Uuid) -> MetadataResult<()>;
}
