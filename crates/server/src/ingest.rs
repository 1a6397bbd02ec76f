//! Ingestion coordinator.
//!
//! Drives the two-phase commit for incoming file content: blob write first,
//! metadata insert second. The metadata row is the authority; a blob without
//! a row is garbage, a row without a blob would be data loss. On a failed
//! insert the freshly written blob is deleted so neither side leaks.

use crate::error::{ApiError, ApiResult};
use crate::index::SearchIndex;
use bytes::Bytes;
use depot_core::config::{AppConfig, StorageConfig};
use depot_core::file::{FileKind, FileVisibility, extension_of};
use depot_core::hash::Fingerprint;
use depot_core::object_key::generate_object_key;
use depot_metadata::{FileRow, MetadataStore};
use depot_storage::BlobStore;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Request to ingest one fully assembled payload.
pub struct IngestRequest {
    pub owner_id: Uuid,
    pub file_name: String,
    pub content_type: Option<String>,
    pub parent_id: Option<Uuid>,
    /// Size the client declared up front, if any. Must match the payload.
    pub declared_size: Option<u64>,
    /// "private" (default) or "public".
    pub visibility: Option<String>,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub data: Bytes,
}

/// Result of a successful ingestion.
#[derive(Debug)]
pub struct IngestOutcome {
    pub file: FileRow,
    /// Whether the blob write was skipped because identical active content
    /// already existed for this owner.
    pub deduplicated: bool,
}

/// Coordinates blob storage, the metadata store, and index propagation.
pub struct IngestionCoordinator {
    config: Arc<AppConfig>,
    storage: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    index: Arc<dyn SearchIndex>,
    bucket: String,
}

impl IngestionCoordinator {
    pub fn new(
        config: Arc<AppConfig>,
        storage: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        index: Arc<dyn SearchIndex>,
    ) -> Self {
        let bucket = match &config.storage {
            StorageConfig::S3 { bucket, .. } => bucket.clone(),
            StorageConfig::Filesystem { .. } => "local".to_string(),
        };
        Self {
            config,
            storage,
            metadata,
            index,
            bucket,
        }
    }

    /// Ingest a payload: validate, fingerprint, dedup, commit.
    #[instrument(skip(self, request), fields(owner_id = %request.owner_id, file_name = %request.file_name, size = request.data.len()))]
    pub async fn ingest(&self, request: IngestRequest) -> ApiResult<IngestOutcome> {
        let IngestRequest {
            owner_id,
            file_name,
            content_type,
            parent_id,
            declared_size,
            visibility,
            description,
            tags,
            data,
        } = request;

        let visibility = match visibility.as_deref() {
            None => FileVisibility::Private,
            Some(raw) => FileVisibility::parse(raw).ok_or_else(|| {
                ApiError::BadRequest(format!("unknown visibility '{raw}'"))
            })?,
        };

        if file_name.trim().is_empty() {
            return Err(ApiError::BadRequest("file name must not be empty".into()));
        }

        let extension = extension_of(&file_name);
        if let Some(ext) = &extension {
            if self.config.server.is_extension_denied(ext) {
                return Err(ApiError::BadRequest(format!(
                    "file extension '{ext}' is not allowed"
                )));
            }
        }

        let size = data.len() as u64;
        if size > self.config.server.max_file_size {
            return Err(ApiError::BadRequest(format!(
                "file size {size} exceeds maximum {}",
                self.config.server.max_file_size
            )));
        }
        if let Some(declared) = declared_size {
            if declared != size {
                return Err(ApiError::Integrity {
                    declared,
                    assembled: size,
                });
            }
        }

        if let Some(pid) = parent_id {
            if !self.metadata.is_active_folder(pid).await? {
                return Err(ApiError::BadRequest(format!(
                    "parent {pid} is not an active folder"
                )));
            }
        }

        let fingerprint = Fingerprint::compute(&data);
        let content_type = content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let kind = FileKind::classify(extension.as_deref().unwrap_or(""), Some(&content_type));
        let now = OffsetDateTime::now_utc();

        // Dedup against this owner's active content. A hit reuses the blob
        // under a fresh record; the bytes are never written twice.
        let existing = self
            .metadata
            .find_active_by_fingerprint(owner_id, &fingerprint.to_hex())
            .await?;

        let (bucket, object_key, deduplicated) = match existing {
            Some(prior) if prior.bucket.is_some() && prior.object_key.is_some() => {
                let bucket = prior.bucket.clone().unwrap_or_default();
                let key = prior.object_key.clone().unwrap_or_default();
                (bucket, key, true)
            }
            _ => {
                let key = generate_object_key(owner_id, &file_name, now);
                self.storage.put(&key, data, &content_type).await?;
                (self.bucket.clone(), key, false)
            }
        };

        let file = FileRow {
            file_id: Uuid::new_v4(),
            owner_id,
            parent_id,
            display_name: file_name.clone(),
            original_name: file_name,
            size_bytes: size as i64,
            content_type,
            extension,
            kind: kind.as_str().to_string(),
            fingerprint: Some(fingerprint.to_hex()),
            bucket: Some(bucket.clone()),
            object_key: Some(object_key.clone()),
            status: "active".to_string(),
            visibility: visibility.as_str().to_string(),
            download_count: 0,
            preview_count: 0,
            description,
            tags,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.metadata.insert_file(&file).await {
            // Compensate: without a row the blob is unreachable. A dedup hit
            // reused an existing blob that other rows still point at, so it
            // must survive.
            if !deduplicated {
                if let Err(del_err) = self.storage.delete(&object_key).await {
                    warn!(
                        %object_key,
                        error = %del_err,
                        "failed to delete orphaned blob after metadata insert failure"
                    );
                }
            }
            return Err(e.into());
        }

        info!(
            file_id = %file.file_id,
            fingerprint = %fingerprint,
            deduplicated,
            "file committed"
        );

        self.propagate_index(file.clone());

        Ok(IngestOutcome {
            file,
            deduplicated,
        })
    }

    /// Create a folder record. Folders carry no blob.
    #[instrument(skip(self), fields(%owner_id, name))]
    pub async fn create_folder(
        &self,
        owner_id: Uuid,
        name: &str,
        parent_id: Option<Uuid>,
    ) -> ApiResult<FileRow> {
        if name.trim().is_empty() {
            return Err(ApiError::BadRequest("folder name must not be empty".into()));
        }
        if let Some(pid) = parent_id {
            if !self.metadata.is_active_folder(pid).await? {
                return Err(ApiError::BadRequest(format!(
                    "parent {pid} is not an active folder"
                )));
            }
        }

        let now = OffsetDateTime::now_utc();
        let folder = FileRow {
            file_id: Uuid::new_v4(),
            owner_id,
            parent_id,
            display_name: name.to_string(),
            original_name: name.to_string(),
            size_bytes: 0,
            content_type: FileKind::FOLDER_CONTENT_TYPE.to_string(),
            extension: None,
            kind: FileKind::Folder.as_str().to_string(),
            fingerprint: None,
            bucket: None,
            object_key: None,
            status: "active".to_string(),
            visibility: "private".to_string(),
            download_count: 0,
            preview_count: 0,
            description: None,
            tags: None,
            created_at: now,
            updated_at: now,
        };

        self.metadata.insert_file(&folder).await?;
        self.propagate_index(folder.clone());
        Ok(folder)
    }

    /// Permanently delete a record, and its blob once nothing references it.
    #[instrument(skip(self), fields(%file_id))]
    pub async fn hard_delete(&self, file_id: Uuid) -> ApiResult<()> {
        let existing = self
            .metadata
            .get_file(file_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("file {file_id} not found")))?;

        if existing.is_folder() && self.metadata.has_active_children(file_id).await? {
            return Err(ApiError::Conflict(format!(
                "folder {file_id} still has children"
            )));
        }

        let deleted = self.metadata.delete_file(file_id).await?;

        if let (Some(bucket), Some(key)) = (&deleted.bucket, &deleted.object_key) {
            let remaining = self.metadata.count_blob_references(bucket, key).await?;
            if remaining == 0 {
                // The row is already gone; a failed blob delete only leaks
                // storage, never correctness.
                if let Err(e) = self.storage.delete(key).await {
                    warn!(object_key = %key, error = %e, "failed to delete unreferenced blob");
                }
            }
        }

        self.propagate_removal(file_id);
        Ok(())
    }

    /// Duplicate a file record under a new id. The blob is shared, not
    /// copied; reference counting at delete time keeps it alive.
    #[instrument(skip(self), fields(%file_id))]
    pub async fn copy_file(
        &self,
        file_id: Uuid,
        display_name: Option<String>,
        parent_id: Option<Uuid>,
    ) -> ApiResult<FileRow> {
        let source = self
            .metadata
            .get_file(file_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("file {file_id} not found")))?;

        if source.is_folder() {
            return Err(ApiError::BadRequest("folders cannot be copied".into()));
        }
        if !source.is_active() {
            return Err(ApiError::Conflict(format!("file {file_id} is trashed")));
        }
        if let Some(pid) = parent_id {
            if !self.metadata.is_active_folder(pid).await? {
                return Err(ApiError::BadRequest(format!(
                    "parent {pid} is not an active folder"
                )));
            }
        }

        let now = OffsetDateTime::now_utc();
        let copy = FileRow {
            file_id: Uuid::new_v4(),
            parent_id: parent_id.or(source.parent_id),
            display_name: display_name.unwrap_or_else(|| source.display_name.clone()),
            download_count: 0,
            preview_count: 0,
            created_at: now,
            updated_at: now,
            ..source
        };

        self.metadata.insert_file(&copy).await?;
        self.propagate_index(copy.clone());
        Ok(copy)
    }

    /// Queue best-effort index propagation. Never blocks or fails the
    /// surrounding commit.
    fn propagate_index(&self, file: FileRow) {
        let index = self.index.clone();
        tokio::spawn(async move {
            if let Err(e) = index.index_file(&file).await {
                warn!(file_id = %file.file_id, error = %e, "search index propagation failed");
            }
        });
    }

    fn propagate_removal(&self, file_id: Uuid) {
        let index = self.index.clone();
        tokio::spawn(async move {
            if let Err(e) = index.remove_file(file_id).await {
                warn!(%file_id, error = %e, "search index removal failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::LoggingIndex;
    use async_trait::async_trait;
    use depot_metadata::{MetadataError, MetadataResult, SqliteStore};
    use depot_storage::FilesystemBackend;
    use tempfile::tempdir;

    async fn coordinator() -> (tempfile::TempDir, IngestionCoordinator, Arc<dyn BlobStore>) {
        let temp = tempdir().unwrap();
        let config = Arc::new(AppConfig::for_testing(temp.path()));
        let storage: Arc<dyn BlobStore> = Arc::new(
            FilesystemBackend::new(temp.path().join("storage"))
                .await
                .unwrap(),
        );
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(temp.path().join("metadata.db"), None)
                .await
                .unwrap(),
        );
        let index = Arc::new(LoggingIndex::new());
        let coordinator =
            IngestionCoordinator::new(config, storage.clone(), metadata, index);
        (temp, coordinator, storage)
    }

    fn request(owner_id: Uuid, name: &str, data: &'static [u8]) -> IngestRequest {
        IngestRequest {
            owner_id,
            file_name: name.to_string(),
            content_type: Some("text/plain".to_string()),
            parent_id: None,
            declared_size: None,
            visibility: None,
            description: None,
            tags: None,
            data: Bytes::from_static(data),
        }
    }

    #[tokio::test]
    async fn ingest_writes_blob_and_row() {
        let (_temp, coordinator, storage) = coordinator().await;
        let owner = Uuid::new_v4();

        let outcome = coordinator
            .ingest(request(owner, "notes.txt", b"hello depot"))
            .await
            .unwrap();

        assert!(!outcome.deduplicated);
        assert_eq!(outcome.file.size_bytes, 11);
        assert_eq!(outcome.file.kind, "document");
        let key = outcome.file.object_key.as_deref().unwrap();
        assert_eq!(storage.get(key).await.unwrap().as_ref(), b"hello depot");
    }

    #[tokio::test]
    async fn identical_content_dedups_to_one_blob() {
        let (_temp, coordinator, storage) = coordinator().await;
        let owner = Uuid::new_v4();

        let first = coordinator
            .ingest(request(owner, "a.txt", b"same bytes"))
            .await
            .unwrap();
        let second = coordinator
            .ingest(request(owner, "b.txt", b"same bytes"))
            .await
            .unwrap();

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_ne!(first.file.file_id, second.file.file_id);
        assert_eq!(first.file.object_key, second.file.object_key);
        assert_eq!(first.file.fingerprint, second.file.fingerprint);

        // Exactly one blob exists.
        let key = first.file.object_key.as_deref().unwrap();
        assert!(storage.exists(key).await.unwrap());
    }

    #[tokio::test]
    async fn different_owners_do_not_share_dedup() {
        let (_temp, coordinator, _storage) = coordinator().await;

        let first = coordinator
            .ingest(request(Uuid::new_v4(), "a.txt", b"same bytes"))
            .await
            .unwrap();
        let second = coordinator
            .ingest(request(Uuid::new_v4(), "a.txt", b"same bytes"))
            .await
            .unwrap();

        assert!(!second.deduplicated);
        assert_ne!(first.file.object_key, second.file.object_key);
    }

    #[tokio::test]
    async fn declared_size_mismatch_is_integrity_error() {
        let (_temp, coordinator, _storage) = coordinator().await;
        let mut req = request(Uuid::new_v4(), "a.txt", b"ten bytes!");
        req.declared_size = Some(99);

        let err = coordinator.ingest(req).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Integrity {
                declared: 99,
                assembled: 10
            }
        ));
    }

    #[tokio::test]
    async fn denied_extension_rejected_before_storage() {
        let (_temp, coordinator, _storage) = coordinator().await;
        let err = coordinator
            .ingest(request(Uuid::new_v4(), "malware.exe", b"MZ"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn hard_delete_keeps_shared_blob_until_last_reference() {
        let (_temp, coordinator, storage) = coordinator().await;
        let owner = Uuid::new_v4();

        let first = coordinator
            .ingest(request(owner, "a.txt", b"shared"))
            .await
            .unwrap();
        let second = coordinator
            .ingest(request(owner, "b.txt", b"shared"))
            .await
            .unwrap();
        let key = first.file.object_key.clone().unwrap();

        coordinator.hard_delete(first.file.file_id).await.unwrap();
        assert!(storage.exists(&key).await.unwrap());

        coordinator.hard_delete(second.file.file_id).await.unwrap();
        assert!(!storage.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn folder_with_children_refuses_hard_delete() {
        let (_temp, coordinator, _storage) = coordinator().await;
        let owner = Uuid::new_v4();

        let folder = coordinator
            .create_folder(owner, "docs", None)
            .await
            .unwrap();
        let mut req = request(owner, "inside.txt", b"content");
        req.parent_id = Some(folder.file_id);
        coordinator.ingest(req).await.unwrap();

        let err = coordinator.hard_delete(folder.file_id).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn copy_shares_the_blob() {
        let (_temp, coordinator, _storage) = coordinator().await;
        let owner = Uuid::new_v4();

        let original = coordinator
            .ingest(request(owner, "a.txt", b"copy me"))
            .await
            .unwrap();
        let copy = coordinator
            .copy_file(original.file.file_id, Some("a (copy).txt".to_string()), None)
            .await
            .unwrap();

        assert_ne!(copy.file_id, original.file.file_id);
        assert_eq!(copy.object_key, original.file.object_key);
        assert_eq!(copy.display_name, "a (copy).txt");
        assert_eq!(copy.download_count, 0);
    }

    /// Store double whose insert always fails, for exercising the
    /// compensating blob delete.
    struct InsertFailsStore;

    #[async_trait]
    impl depot_metadata::FileRepo for InsertFailsStore {
        async fn insert_file(&self, _file: &FileRow) -> MetadataResult<()> {
            Err(MetadataError::Internal("injected insert failure".into()))
        }
        async fn get_file(&self, _file_id: Uuid) -> MetadataResult<Option<FileRow>> {
            Ok(None)
        }
        async fn find_active_by_fingerprint(
            &self,
            _owner_id: Uuid,
            _fingerprint: &str,
        ) -> MetadataResult<Option<FileRow>> {
            Ok(None)
        }
        async fn count_blob_references(
            &self,
            _bucket: &str,
            _object_key: &str,
        ) -> MetadataResult<u64> {
            Ok(0)
        }
        async fn list_children(
            &self,
            _owner_id: Uuid,
            _parent_id: Option<Uuid>,
        ) -> MetadataResult<Vec<FileRow>> {
            Ok(Vec::new())
        }
        async fn trash_file(&self, _: Uuid, _: OffsetDateTime) -> MetadataResult<()> {
            Ok(())
        }
        async fn restore_file(&self, _: Uuid, _: OffsetDateTime) -> MetadataResult<()> {
            Ok(())
        }
        async fn delete_file(&self, file_id: Uuid) -> MetadataResult<FileRow> {
            Err(MetadataError::NotFound(file_id.to_string()))
        }
        async fn rename_file(&self, _: Uuid, _: &str, _: OffsetDateTime) -> MetadataResult<()> {
            Ok(())
        }
        async fn move_file(
            &self,
            _: Uuid,
            _: Option<Uuid>,
            _: OffsetDateTime,
        ) -> MetadataResult<()> {
            Ok(())
        }
        async fn increment_download_count(&self, _: Uuid) -> MetadataResult<()> {
            Ok(())
        }
        async fn increment_preview_count(&self, _: Uuid) -> MetadataResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl depot_metadata::FolderRepo for InsertFailsStore {
        async fn is_active_folder(&self, _: Uuid) -> MetadataResult<bool> {
            Ok(false)
        }
        async fn has_active_children(&self, _: Uuid) -> MetadataResult<bool> {
            Ok(false)
        }
        async fn count_active_children(&self, _: Uuid) -> MetadataResult<u64> {
            Ok(0)
        }
    }

    #[async_trait]
    impl MetadataStore for InsertFailsStore {
        async fn migrate(&self) -> MetadataResult<()> {
            Ok(())
        }
        async fn health_check(&self) -> MetadataResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_insert_deletes_fresh_blob() {
        let temp = tempdir().unwrap();
        let config = Arc::new(AppConfig::for_testing(temp.path()));
        let storage: Arc<dyn BlobStore> = Arc::new(
            FilesystemBackend::new(temp.path().join("storage"))
                .await
                .unwrap(),
        );
        let coordinator = IngestionCoordinator::new(
            config,
            storage.clone(),
            Arc::new(InsertFailsStore),
            Arc::new(LoggingIndex::new()),
        );

        let err = coordinator
            .ingest(request(Uuid::new_v4(), "a.txt", b"doomed"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Metadata(_)));

        // The orphaned blob was compensated away. Empty directories may
        // remain but no object file does.
        assert_eq!(count_files(temp.path().join("storage")).await, 0);
    }

    async fn count_files(root: std::path::PathBuf) -> usize {
        let mut count = 0;
        let mut stack = vec![root];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
            while let Some(entry) = entries.next_entry().await.unwrap() {
                let ty = entry.file_type().await.unwrap();
                if ty.is_dir() {
                    stack.push(entry.path());
                } else {
                    count += 1;
                }
            }
        }
        count
    }
}
