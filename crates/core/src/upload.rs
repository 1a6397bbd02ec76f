//! Chunked upload session types and lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Maximum length of a client-supplied session identifier.
const MAX_SESSION_ID_LEN: usize = 128;

/// Identifier for an upload session.
///
/// Sessions may be opened with a client-supplied id (so a client can resume
/// after reconnecting) or with a server-issued random id.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Issue a new random session ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate and wrap a client-supplied session ID.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.is_empty() || s.len() > MAX_SESSION_ID_LEN {
            return Err(crate::Error::InvalidSessionId(format!(
                "session id length must be 1..={MAX_SESSION_ID_LEN}"
            )));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        {
            return Err(crate::Error::InvalidSessionId(
                "session id must be alphanumeric with - or _".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload session state.
///
/// `Open` is the only state that accepts chunks. `Complete` means every chunk
/// index in `[0, total_chunks)` has been received and a merge-and-commit is in
/// flight; the remaining three states are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Session exists and is accepting chunks.
    Open,
    /// All chunks received; merge-and-commit in progress.
    Complete,
    /// Merged and committed; blob and metadata written.
    Committed,
    /// Explicitly cancelled by the uploader.
    Cancelled,
    /// Reclaimed by the idle-timeout sweep.
    Expired,
}

impl SessionState {
    /// Check if the session can still receive chunks.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Cancelled | Self::Expired)
    }
}

/// Progress snapshot of an upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadProgress {
    /// The session this snapshot describes.
    pub session_id: SessionId,
    /// Target file name declared at open.
    pub file_name: String,
    /// Declared total size in bytes.
    pub total_size: u64,
    /// Declared chunk count.
    pub total_chunks: u32,
    /// Number of distinct chunk indices received so far.
    pub received_chunks: u32,
    /// Completion percentage in `[0, 100]`.
    pub progress_percent: u8,
    /// When the session last received a chunk.
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
    /// Current session state.
    pub state: SessionState,
}

impl UploadProgress {
    /// Compute the percentage for a received/total pair.
    pub fn percent(received: u32, total: u32) -> u8 {
        if total == 0 {
            return 100;
        }
        ((received as u64 * 100) / total as u64) as u8
    }
}
