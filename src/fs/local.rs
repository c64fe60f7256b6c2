use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::fs::backend::LocalStorage;
use crate::fs::path::split_parent;
use crate::fs::types::{is_hidden, FileType, LocalNode};
use crate::fs::Result;

/// Name of the per-folder metadata sidecar.
pub const METADATA_FILE: &str = ".metadata.json";

/// Metadata of every file in one folder: file name -> key -> record.
type FolderMetadata = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// Local storage rooted at a directory on disk.
///
/// Per-file metadata lives in a `.metadata.json` sidecar next to the files.
/// Hidden files (including the sidecar) never show up in listings.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create `folder` below the root if it doesn't exist yet.
    pub fn ensure_folder(&self, folder: &str) -> Result<()> {
        let path = self.full_path(folder);
        fs::create_dir_all(&path)
            .map_err(|e| StorageError::from_io_error(e, "creating folder", &path))
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn read_tree(dir: &Path) -> Result<Vec<LocalNode>> {
        let metadata = read_sidecar(dir)?;
        let read_dir =
            fs::read_dir(dir).map_err(|e| StorageError::from_io_error(e, "listing", dir))?;

        let mut nodes = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| StorageError::from_io_error(e, "listing", dir))?;
            let name = entry.file_name().to_string_lossy().to_string();

            if is_hidden(&name) {
                continue;
            }

            let path = entry.path();
            let file_meta = entry
                .metadata()
                .map_err(|e| StorageError::from_io_error(e, "reading metadata of", &path))?;

            if file_meta.is_dir() {
                nodes.push(LocalNode::Folder {
                    children: Self::read_tree(&path)?,
                    name,
                });
            } else {
                nodes.push(LocalNode::File {
                    file_type: FileType::from_name(&name),
                    size: file_meta.len(),
                    metadata: metadata.get(&name).cloned().unwrap_or_default(),
                    name,
                });
            }
        }

        nodes.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(nodes)
    }

    /// Apply `update` to the sidecar entry of the file at `path`.
    async fn update_metadata<F>(&self, path: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut FolderMetadata, &str) + Send + 'static,
    {
        let (parent, name) = split_parent(path.trim_start_matches('/'));
        let dir = self.full_path(parent);
        let name = name.to_string();
        let sidecar_dir = dir.clone();

        tokio::task::spawn_blocking(move || {
            let mut metadata = read_sidecar(&sidecar_dir)?;
            update(&mut metadata, &name);
            write_sidecar(&sidecar_dir, &metadata)
        })
        .await
        .map_err(|e| StorageError::Io {
            path: dir.join(METADATA_FILE),
            operation: "updating".to_string(),
            source: std::io::Error::other(e),
        })?
    }
}

fn read_sidecar(dir: &Path) -> Result<FolderMetadata> {
    let path = dir.join(METADATA_FILE);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FolderMetadata::new()),
        Err(e) => return Err(StorageError::from_io_error(e, "reading", &path)),
    };

    serde_json::from_str(&content).map_err(|e| StorageError::Metadata {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn write_sidecar(dir: &Path, metadata: &FolderMetadata) -> Result<()> {
    let path = dir.join(METADATA_FILE);
    if metadata.is_empty() {
        return match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io_error(e, "removing", &path)),
        };
    }

    let json = serde_json::to_vec_pretty(metadata).map_err(|e| StorageError::Metadata {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    // Write to a sibling temp file and rename so readers never see half a sidecar
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| StorageError::from_io_error(e, "creating temp file in", dir))?;
    tmp.write_all(&json)
        .map_err(|e| StorageError::from_io_error(e, "writing", tmp.path()))?;
    tmp.persist(&path)
        .map_err(|e| StorageError::from_io_error(e.error, "replacing", &path))?;

    Ok(())
}

#[async_trait]
impl LocalStorage for LocalStore {
    async fn list_tree(&self, folder: &str) -> Result<Vec<LocalNode>> {
        let dir = self.full_path(folder);
        let walk_dir = dir.clone();
        tokio::task::spawn_blocking(move || Self::read_tree(&walk_dir))
            .await
            .map_err(|e| StorageError::Io {
                path: dir,
                operation: "listing".to_string(),
                source: std::io::Error::other(e),
            })?
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.full_path(path);
        tokio::fs::read(&full)
            .await
            .map_err(|e| StorageError::from_io_error(e, "reading", &full))
    }

    async fn add_file(&self, path: &str, source: &Path) -> Result<()> {
        let dest = self.full_path(path);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::from_io_error(e, "creating folder", parent))?;
        }

        if tokio::fs::rename(source, &dest).await.is_err() {
            // Different filesystem: fall back to copy + remove
            tokio::fs::copy(source, &dest)
                .await
                .map_err(|e| StorageError::from_io_error(e, "copying into", &dest))?;
            tokio::fs::remove_file(source)
                .await
                .map_err(|e| StorageError::from_io_error(e, "removing", source))?;
        }

        // The old record described the replaced content
        self.update_metadata(path, |metadata, name| {
            metadata.remove(name);
        })
        .await
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| StorageError::from_io_error(e, "deleting", &full))?;

        self.update_metadata(path, |metadata, name| {
            metadata.remove(name);
        })
        .await
    }

    async fn set_metadata(&self, path: &str, key: &str, value: serde_json::Value) -> Result<()> {
        let full = self.full_path(path);
        match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(StorageError::NotFound {
                    path: path.to_string(),
                })
            }
            Err(e) => return Err(StorageError::from_io_error(e, "reading metadata of", &full)),
        }

        let key = key.to_string();
        self.update_metadata(path, move |metadata, name| {
            metadata.entry(name.to_string()).or_default().insert(key, value);
        })
        .await
    }

    fn display_path(&self, path: &str) -> String {
        self.full_path(path).to_string_lossy().to_string()
    }
}
