//! File identifiers, classification and lifecycle flags.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a committed file record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(Uuid);

impl FileId {
    /// Generate a new random file ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidFileName(format!("invalid file ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for FileId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a file record.
///
/// Soft deletion marks the row `Trashed`; the blob and the row survive until
/// an explicit hard delete. Soft-deleted content is eligible for re-ingestion
/// under the same fingerprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Record is visible and servable.
    Active,
    /// Record is soft-deleted.
    Trashed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trashed => "trashed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "trashed" => Some(Self::Trashed),
            _ => None,
        }
    }
}

/// Visibility of a file record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileVisibility {
    Private,
    Public,
}

impl FileVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

impl Default for FileVisibility {
    fn default() -> Self {
        Self::Private
    }
}

/// Closed classification of file content.
///
/// Replaces cascading extension string comparisons with a single tagged
/// variant computed once at ingestion time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Document,
    Video,
    Audio,
    Archive,
    Folder,
    Other,
}

impl FileKind {
    /// Classify from a lowercase extension and an optional content type.
    ///
    /// Pure function: the same inputs always produce the same kind. The
    /// content type wins for the folder sentinel; otherwise the extension
    /// decides and the content-type prefix is a fallback.
    pub fn classify(extension: &str, content_type: Option<&str>) -> Self {
        if content_type == Some(Self::FOLDER_CONTENT_TYPE) {
            return Self::Folder;
        }

        match extension.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "svg" | "ico" | "tiff" => Self::Image,
            "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "txt" | "md" | "csv"
            | "odt" | "rtf" => Self::Document,
            "mp4" | "mkv" | "avi" | "mov" | "wmv" | "flv" | "webm" | "m4v" => Self::Video,
            "mp3" | "wav" | "flac" | "aac" | "ogg" | "m4a" | "wma" => Self::Audio,
            "zip" | "tar" | "gz" | "bz2" | "xz" | "7z" | "rar" | "zst" => Self::Archive,
            _ => match content_type {
                Some(ct) if ct.starts_with("image/") => Self::Image,
                Some(ct) if ct.starts_with("video/") => Self::Video,
                Some(ct) if ct.starts_with("audio/") => Self::Audio,
                Some(ct) if ct.starts_with("text/") => Self::Document,
                _ => Self::Other,
            },
        }
    }

    /// Sentinel content type marking a folder record.
    pub const FOLDER_CONTENT_TYPE: &'static str = "folder";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Archive => "archive",
            Self::Folder => "folder",
            Self::Other => "other",
        }
    }
}

/// Extract the lowercase extension from a file name, if any.
pub fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.contains('/') {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
