//! Object key generation for the blob store.
//!
//! Keys are generated fresh for every blob write and are never reused across
//! distinct content after a successful commit. The layout fans writes out by
//! owner and date so a single prefix never accumulates millions of objects:
//! `files/{owner}/{yyyy}/{mm}/{dd}/{uuid}-{name}`.

use time::OffsetDateTime;
use uuid::Uuid;

/// Maximum length of the sanitized name component in an object key.
const MAX_KEY_NAME_LEN: usize = 120;

/// Generate a fresh object key for an owner's upload.
///
/// The embedded UUID makes every key unique even when the same owner uploads
/// the same file name twice on the same day, so concurrent identical uploads
/// never collide on a key.
pub fn generate_object_key(owner_id: Uuid, file_name: &str, now: OffsetDateTime) -> String {
    format!(
        "files/{}/{:04}/{:02}/{:02}/{}-{}",
        owner_id,
        now.year(),
        u8::from(now.month()),
        now.day(),
        Uuid::new_v4(),
        sanitize_name(file_name),
    )
}

/// Sanitize a client-supplied file name for embedding in an object key.
///
/// Path separators, dot segments and control characters are replaced so a key
/// can never escape its prefix regardless of backend.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches('.');
    let safe = if trimmed.is_empty() { "file" } else { trimmed };

    safe.chars().take(MAX_KEY_NAME_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let owner = Uuid::new_v4();
        let now = time::macros::datetime!(2026-03-07 12:00:00 UTC);
        let key = generate_object_key(owner, "photo.jpg", now);

        assert!(key.starts_with(&format!("files/{}/2026/03/07/", owner)));
        assert!(key.ends_with("-photo.jpg"));
    }

    #[test]
    fn test_keys_are_unique_per_call() {
        let owner = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let a = generate_object_key(owner, "same.txt", now);
        let b = generate_object_key(owner, "same.txt", now);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sanitize_strips_traversal() {
        assert_eq!(sanitize_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_name("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_name(""), "file");
        assert_eq!(sanitize_name("..."), "file");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_name(&long).len(), 120);
    }
}
