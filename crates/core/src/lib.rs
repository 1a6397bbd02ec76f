//! Core domain types and shared logic for the Depot file backend.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content fingerprints (the dedup identity of file bytes)
//! - File identifiers, kinds, status and visibility flags
//! - Object key generation for the blob store
//! - Chunked upload session lifecycle
//! - Configuration shared by the server binary and tests

pub mod config;
pub mod error;
pub mod file;
pub mod hash;
pub mod object_key;
pub mod upload;

pub use error::{Error, Result};
pub use file::{FileId, FileKind, FileStatus, FileVisibility};
pub use hash::{Fingerprint, FingerprintHasher};
pub use object_key::generate_object_key;
pub use upload::{SessionId, SessionState};

/// Default maximum size of a single uploaded file: 1 GiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Maximum number of chunks a single upload session may declare.
pub const MAX_CHUNK_COUNT: u32 = 10_000;

/// Maximum size of a single chunk: 32 MiB.
pub const MAX_CHUNK_SIZE: u64 = 32 * 1024 * 1024;
