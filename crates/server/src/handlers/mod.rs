//! HTTP request handlers.

pub mod files;
pub mod health;
pub mod uploads;

pub use files::{
    copy_file, create_folder, delete_file, download_file, get_file, list_files,
    list_folder_children, move_file, presign_file, rename_file, restore_file, upload_file,
};
pub use health::health_check;
pub use uploads::{cancel_upload, create_upload, get_upload, upload_chunk};
