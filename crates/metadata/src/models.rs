//! Database row models.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A file or folder record.
///
/// Folders are rows with `kind = "folder"` and no blob pointer. Regular files
/// carry a content fingerprint plus the `(bucket, object_key)` pair locating
/// their blob. Several rows may share one blob pair after deduplication.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct FileRow {
    pub file_id: Uuid,
    pub owner_id: Uuid,
    /// Containing folder, or NULL for the owner's root.
    pub parent_id: Option<Uuid>,
    /// Name shown to the user; rename updates this, never `original_name`.
    pub display_name: String,
    /// Name as received at upload time.
    pub original_name: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub extension: Option<String>,
    /// Coarse classification ("image", "document", "folder", ...).
    pub kind: String,
    /// Hex SHA-256 of the content. NULL for folders.
    pub fingerprint: Option<String>,
    pub bucket: Option<String>,
    pub object_key: Option<String>,
    /// "active" or "trashed".
    pub status: String,
    /// "private" or "public".
    pub visibility: String,
    pub download_count: i64,
    pub preview_count: i64,
    pub description: Option<String>,
    /// Comma-separated user tags.
    pub tags: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl FileRow {
    pub fn is_folder(&self) -> bool {
        self.kind == "folder"
    }

    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}
