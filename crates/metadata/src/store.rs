//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{FileRepo, FolderRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: FileRepo + FolderRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection avoids
            // persistent "database is locked" failures under concurrent handlers.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        if let Some(timeout) = query_timeout_secs {
            tracing::warn!(
                query_timeout_secs = timeout,
                "SQLite query timeout is advisory only; long queries may exceed it"
            );
        }

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

/// Current schema. Statements are idempotent so the whole block re-runs
/// safely on every startup.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    file_id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    parent_id TEXT,
    display_name TEXT NOT NULL,
    original_name TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    content_type TEXT NOT NULL,
    extension TEXT,
    kind TEXT NOT NULL,
    fingerprint TEXT,
    bucket TEXT,
    object_key TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    visibility TEXT NOT NULL DEFAULT 'private',
    download_count INTEGER NOT NULL DEFAULT 0,
    preview_count INTEGER NOT NULL DEFAULT 0,
    description TEXT,
    tags TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_owner_parent
    ON files (owner_id, parent_id)
    WHERE status = 'active';

CREATE INDEX IF NOT EXISTS idx_files_fingerprint
    ON files (owner_id, fingerprint)
    WHERE fingerprint IS NOT NULL AND status = 'active';

CREATE INDEX IF NOT EXISTS idx_files_object_key
    ON files (bucket, object_key)
    WHERE object_key IS NOT NULL;

-- Sibling folder names must be unique among active folders. COALESCE folds
-- NULL parents (root) into one bucket, since NULLs compare distinct in
-- SQLite unique indexes.
CREATE UNIQUE INDEX IF NOT EXISTS idx_files_folder_sibling_name
    ON files (owner_id, COALESCE(parent_id, ''), display_name)
    WHERE kind = 'folder' AND status = 'active';
"#;

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::FileRow;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn insert_file(&self, file: &FileRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO files (
                    file_id, owner_id, parent_id, display_name, original_name,
                    size_bytes, content_type, extension, kind, fingerprint,
                    bucket, object_key, status, visibility, download_count,
                    preview_count, description, tags, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(file.file_id)
            .bind(file.owner_id)
            .bind(file.parent_id)
            .bind(&file.display_name)
            .bind(&file.original_name)
            .bind(file.size_bytes)
            .bind(&file.content_type)
            .bind(&file.extension)
            .bind(&file.kind)
            .bind(&file.fingerprint)
            .bind(&file.bucket)
            .bind(&file.object_key)
            .bind(&file.status)
            .bind(&file.visibility)
            .bind(file.download_count)
            .bind(file.preview_count)
            .bind(&file.description)
            .bind(&file.tags)
            .bind(file.created_at)
            .bind(file.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MetadataError::from_insert(
                    e,
                    &format!("name '{}' conflicts with a sibling", file.display_name),
                )
            })?;
            Ok(())
        }

        async fn get_file(&self, file_id: Uuid) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE file_id = ?")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn find_active_by_fingerprint(
            &self,
            owner_id: Uuid,
            fingerprint: &str,
        ) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>(
                "SELECT * FROM files
                 WHERE owner_id = ? AND fingerprint = ? AND status = 'active'
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(owner_id)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn count_blob_references(
            &self,
            bucket: &str,
            object_key: &str,
        ) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM files WHERE bucket = ? AND object_key = ?",
            )
            .bind(bucket)
            .bind(object_key)
            .fetch_one(&self.pool)
            .await?;
            Ok(count as u64)
        }

        async fn list_children(
            &self,
            owner_id: Uuid,
            parent_id: Option<Uuid>,
        ) -> MetadataResult<Vec<FileRow>> {
            let rows = match parent_id {
                Some(id) => {
                    sqlx::query_as::<_, FileRow>(
                        "SELECT * FROM files
                         WHERE owner_id = ? AND parent_id = ? AND status = 'active'
                         ORDER BY kind = 'folder' DESC, display_name",
                    )
                    .bind(owner_id)
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as::<_, FileRow>(
                        "SELECT * FROM files
                         WHERE owner_id = ? AND parent_id IS NULL AND status = 'active'
                         ORDER BY kind = 'folder' DESC, display_name",
                    )
                    .bind(owner_id)
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            Ok(rows)
        }

        async fn trash_file(
            &self,
            file_id: Uuid,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE files SET status = 'trashed', updated_at = ?
                 WHERE file_id = ? AND status = 'active'",
            )
            .bind(updated_at)
            .bind(file_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "active file {file_id} not found"
                )));
            }
            Ok(())
        }

        async fn restore_file(
            &self,
            file_id: Uuid,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE files SET status = 'active', updated_at = ?
                 WHERE file_id = ? AND status = 'trashed'",
            )
            .bind(updated_at)
            .bind(file_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "trashed file {file_id} not found"
                )));
            }
            Ok(())
        }

        async fn delete_file(&self, file_id: Uuid) -> MetadataResult<FileRow> {
            let mut tx = self.pool.begin().await?;

            let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE file_id = ?")
                .bind(file_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("file {file_id} not found")))?;

            sqlx::query("DELETE FROM files WHERE file_id = ?")
                .bind(file_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(row)
        }

        async fn rename_file(
            &self,
            file_id: Uuid,
            display_name: &str,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE files SET display_name = ?, updated_at = ? WHERE file_id = ?",
            )
            .bind(display_name)
            .bind(updated_at)
            .bind(file_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MetadataError::from_insert(
                    e,
                    &format!("name '{display_name}' conflicts with a sibling"),
                )
            })?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("file {file_id} not found")));
            }
            Ok(())
        }

        async fn move_file(
            &self,
            file_id: Uuid,
            new_parent_id: Option<Uuid>,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result =
                sqlx::query("UPDATE files SET parent_id = ?, updated_at = ? WHERE file_id = ?")
                    .bind(new_parent_id)
                    .bind(updated_at)
                    .bind(file_id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| {
                        MetadataError::from_insert(e, "destination has a sibling with this name")
                    })?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("file {file_id} not found")));
            }
            Ok(())
        }

        async fn increment_download_count(&self, file_id: Uuid) -> MetadataResult<()> {
            sqlx::query(
                "UPDATE files SET download_count = download_count + 1 WHERE file_id = ?",
            )
            .bind(file_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn increment_preview_count(&self, file_id: Uuid) -> MetadataResult<()> {
            sqlx::query("UPDATE files SET preview_count = preview_count + 1 WHERE file_id = ?")
                .bind(file_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl FolderRepo for SqliteStore {
        async fn is_active_folder(&self, file_id: Uuid) -> MetadataResult<bool> {
            let row: Option<(i32,)> = sqlx::query_as(
                "SELECT 1 FROM files
                 WHERE file_id = ? AND kind = 'folder' AND status = 'active'",
            )
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.is_some())
        }

        async fn has_active_children(&self, folder_id: Uuid) -> MetadataResult<bool> {
            let row: Option<(i32,)> = sqlx::query_as(
                "SELECT 1 FROM files WHERE parent_id = ? AND status = 'active' LIMIT 1",
            )
            .bind(folder_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.is_some())
        }

        async fn count_active_children(&self, folder_id: Uuid) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM files WHERE parent_id = ? AND status = 'active'",
            )
            .bind(folder_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(count as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileRow;
    use time::OffsetDateTime;
    use uuid::Uuid;

    async fn store() -> (tempfile::TempDir, SqliteStore) {
        let temp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db"), None)
            .await
            .unwrap();
        (temp, store)
    }

    fn file_row(owner_id: Uuid, name: &str) -> FileRow {
        let now = OffsetDateTime::now_utc();
        FileRow {
            file_id: Uuid::new_v4(),
            owner_id,
            parent_id: None,
            display_name: name.to_string(),
            original_name: name.to_string(),
            size_bytes: 42,
            content_type: "text/plain".to_string(),
            extension: Some("txt".to_string()),
            kind: "document".to_string(),
            fingerprint: Some("ab".repeat(32)),
            bucket: Some("depot".to_string()),
            object_key: Some(format!("files/{owner_id}/2026/01/01/x-{name}")),
            status: "active".to_string(),
            visibility: "private".to_string(),
            download_count: 0,
            preview_count: 0,
            description: None,
            tags: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn folder_row(owner_id: Uuid, name: &str, parent_id: Option<Uuid>) -> FileRow {
        FileRow {
            parent_id,
            size_bytes: 0,
            content_type: "folder".to_string(),
            extension: None,
            kind: "folder".to_string(),
            fingerprint: None,
            bucket: None,
            object_key: None,
            ..file_row(owner_id, name)
        }
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let (_temp, store) = store().await;
        let file = file_row(Uuid::new_v4(), "report.txt");
        store.insert_file(&file).await.unwrap();

        let fetched = store.get_file(file.file_id).await.unwrap().unwrap();
        assert_eq!(fetched.display_name, "report.txt");
        assert_eq!(fetched.size_bytes, 42);
        assert_eq!(fetched.fingerprint, file.fingerprint);
        assert!(fetched.is_active());
        assert!(!fetched.is_folder());
    }

    #[tokio::test]
    async fn fingerprint_lookup_ignores_trashed() {
        let (_temp, store) = store().await;
        let owner = Uuid::new_v4();
        let file = file_row(owner, "a.txt");
        let fp = file.fingerprint.clone().unwrap();
        store.insert_file(&file).await.unwrap();

        assert!(
            store
                .find_active_by_fingerprint(owner, &fp)
                .await
                .unwrap()
                .is_some()
        );

        store
            .trash_file(file.file_id, OffsetDateTime::now_utc())
            .await
            .unwrap();

        assert!(
            store
                .find_active_by_fingerprint(owner, &fp)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn sibling_folder_names_unique() {
        let (_temp, store) = store().await;
        let owner = Uuid::new_v4();
        store
            .insert_file(&folder_row(owner, "docs", None))
            .await
            .unwrap();

        let err = store
            .insert_file(&folder_row(owner, "docs", None))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::Constraint(_)));

        // Same name under a different parent is fine.
        let parent = folder_row(owner, "other", None);
        store.insert_file(&parent).await.unwrap();
        store
            .insert_file(&folder_row(owner, "docs", Some(parent.file_id)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn trashed_folder_frees_its_name() {
        let (_temp, store) = store().await;
        let owner = Uuid::new_v4();
        let folder = folder_row(owner, "docs", None);
        store.insert_file(&folder).await.unwrap();
        store
            .trash_file(folder.file_id, OffsetDateTime::now_utc())
            .await
            .unwrap();

        store
            .insert_file(&folder_row(owner, "docs", None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn children_guard_for_folder_delete() {
        let (_temp, store) = store().await;
        let owner = Uuid::new_v4();
        let folder = folder_row(owner, "docs", None);
        store.insert_file(&folder).await.unwrap();

        assert!(!store.has_active_children(folder.file_id).await.unwrap());

        let mut child = file_row(owner, "a.txt");
        child.parent_id = Some(folder.file_id);
        store.insert_file(&child).await.unwrap();

        assert!(store.has_active_children(folder.file_id).await.unwrap());
        assert_eq!(store.count_active_children(folder.file_id).await.unwrap(), 1);

        store
            .trash_file(child.file_id, OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert!(!store.has_active_children(folder.file_id).await.unwrap());
    }

    #[tokio::test]
    async fn blob_reference_counting() {
        let (_temp, store) = store().await;
        let owner = Uuid::new_v4();
        let a = file_row(owner, "a.txt");
        let mut b = file_row(owner, "b.txt");
        b.bucket = a.bucket.clone();
        b.object_key = a.object_key.clone();

        store.insert_file(&a).await.unwrap();
        store.insert_file(&b).await.unwrap();

        let (bucket, key) = (a.bucket.as_deref().unwrap(), a.object_key.as_deref().unwrap());
        assert_eq!(store.count_blob_references(bucket, key).await.unwrap(), 2);

        let deleted = store.delete_file(a.file_id).await.unwrap();
        assert_eq!(deleted.file_id, a.file_id);
        assert_eq!(store.count_blob_references(bucket, key).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rename_and_move() {
        let (_temp, store) = store().await;
        let owner = Uuid::new_v4();
        let folder = folder_row(owner, "docs", None);
        let file = file_row(owner, "a.txt");
        store.insert_file(&folder).await.unwrap();
        store.insert_file(&file).await.unwrap();

        let now = OffsetDateTime::now_utc();
        store.rename_file(file.file_id, "b.txt", now).await.unwrap();
        store
            .move_file(file.file_id, Some(folder.file_id), now)
            .await
            .unwrap();

        let fetched = store.get_file(file.file_id).await.unwrap().unwrap();
        assert_eq!(fetched.display_name, "b.txt");
        assert_eq!(fetched.parent_id, Some(folder.file_id));
        // The upload-time name is immutable.
        assert_eq!(fetched.original_name, "a.txt");

        let children = store.list_children(owner, Some(folder.file_id)).await.unwrap();
        assert_eq!(children.len(), 1);
        assert!(store.list_children(owner, None).await.unwrap().len() == 1);
    }

    #[tokio::test]
    async fn restore_requires_trashed_state() {
        let (_temp, store) = store().await;
        let file = file_row(Uuid::new_v4(), "a.txt");
        store.insert_file(&file).await.unwrap();

        let err = store
            .restore_file(file.file_id, OffsetDateTime::now_utc())
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));

        store
            .trash_file(file.file_id, OffsetDateTime::now_utc())
            .await
            .unwrap();
        store
            .restore_file(file.file_id, OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert!(store.get_file(file.file_id).await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn counters_increment() {
        let (_temp, store) = store().await;
        let file = file_row(Uuid::new_v4(), "a.txt");
        store.insert_file(&file).await.unwrap();

        store.increment_download_count(file.file_id).await.unwrap();
        store.increment_download_count(file.file_id).await.unwrap();
        store.increment_preview_count(file.file_id).await.unwrap();

        let fetched = store.get_file(file.file_id).await.unwrap().unwrap();
        assert_eq!(fetched.download_count, 2);
        assert_eq!(fetched.preview_count, 1);
    }
}
