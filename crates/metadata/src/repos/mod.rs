//! Repository trait definitions.

pub mod files;
pub mod folders;

pub use files::FileRepo;
pub use folders::FolderRepo;
