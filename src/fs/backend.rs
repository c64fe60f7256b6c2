use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::fs::types::{is_hidden, DeleteResponse, FileType, LocalNode, RemoteFileInfo, RemoteItem, UploadResult};
use crate::fs::Result;

/// Local file storage the synced folder lives in.
///
/// Paths are relative to the storage root, e.g. `cloud/sub/part.gcode`.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    /// List a folder's nested contents (files and folders, recursively).
    async fn list_tree(&self, folder: &str) -> Result<Vec<LocalNode>>;

    /// Read a file's bytes.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Register `source` as the file at `path`, replacing any existing file.
    ///
    /// Implementations may move `source` rather than copy it.
    async fn add_file(&self, path: &str, source: &Path) -> Result<()>;

    /// Delete a file. A missing file is reported as [`StorageError::NotFound`](crate::error::StorageError::NotFound).
    async fn remove_file(&self, path: &str) -> Result<()>;

    /// Attach or overwrite the metadata record stored under `key` for a file.
    async fn set_metadata(&self, path: &str, key: &str, value: serde_json::Value) -> Result<()>;

    /// Whether a file with this name may be stored locally at all.
    ///
    /// Hidden names are refused: a listing never shows them, so they could
    /// never be seen as synced.
    fn is_valid_file_type(&self, name: &str) -> bool {
        !is_hidden(name) && FileType::from_name(name).is_machine_code()
    }

    /// Get display path for a storage-relative path
    fn display_path(&self, path: &str) -> String {
        path.to_string()
    }
}

/// Remote cloud storage the local folder is mirrored against.
///
/// Files are addressed by a folder id plus a canonical path below it.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// List the immediate children of a folder.
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteItem>>;

    /// Fetch current metadata of a file.
    async fn file_info(&self, folder_id: &str, path: &str) -> Result<RemoteFileInfo>;

    /// Download a file into a fresh temporary file and return its location.
    ///
    /// The caller owns the returned file and is responsible for removing it.
    async fn download(&self, folder_id: &str, path: &str) -> Result<PathBuf>;

    /// Store `data` as the file at `path`, replacing any existing object.
    async fn upload(&self, folder_id: &str, path: &str, data: Vec<u8>) -> Result<UploadResult>;

    /// Delete a file.
    async fn delete(&self, folder_id: &str, path: &str) -> Result<DeleteResponse>;

    /// Get display path for a file below a folder
    fn display_path(&self, folder_id: &str, path: &str) -> String {
        format!("{}:{}", folder_id, path)
    }
}
