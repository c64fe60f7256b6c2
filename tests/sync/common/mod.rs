// In-memory storages for driving the engine in tests
// Both record call counts and can be told to fail specific operations

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use ferry::error::StorageError;
use ferry::fs::path::{canonicalize, child_path};
use ferry::fs::{
    self, DeleteResponse, FileType, LocalNode, LocalStorage, RemoteFileInfo, RemoteItem,
    RemoteStorage, SyncMetadata, UploadResult, SYNC_METADATA_KEY,
};
use ferry::sync::{SyncConfig, SyncMode};

pub fn config(mode: SyncMode) -> SyncConfig {
    SyncConfig {
        mode,
        remote_folder_id: "/".to_string(),
        ..Default::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemFile {
    pub data: Vec<u8>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Local storage keyed by storage-relative path, e.g. `cloud/sub/a.gcode`.
#[derive(Default)]
pub struct MemoryLocal {
    files: Mutex<BTreeMap<String, MemFile>>,
    pub list_calls: AtomicUsize,
    pub fail_listing: AtomicBool,
    pub fail_add: AtomicBool,
}

impl MemoryLocal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, data: &[u8]) {
        self.files.lock().unwrap().insert(
            path.to_string(),
            MemFile {
                data: data.to_vec(),
                metadata: BTreeMap::new(),
            },
        );
    }

    /// A file a previous sync already recorded.
    pub fn put_synced(&self, path: &str, data: &[u8], tag: &str) {
        let meta = serde_json::to_value(SyncMetadata::new(tag, format!("id:{}", path))).unwrap();
        let mut metadata = BTreeMap::new();
        metadata.insert(SYNC_METADATA_KEY.to_string(), meta);
        self.files.lock().unwrap().insert(
            path.to_string(),
            MemFile {
                data: data.to_vec(),
                metadata,
            },
        );
    }

    pub fn get(&self, path: &str) -> Option<MemFile> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    pub fn sync_metadata(&self, path: &str) -> Option<SyncMetadata> {
        self.get(path)
            .and_then(|f| f.metadata.get(SYNC_METADATA_KEY).cloned())
            .map(|v| serde_json::from_value(v).unwrap())
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

fn insert_node(nodes: &mut Vec<LocalNode>, segments: &[&str], file: &MemFile) {
    let (first, rest) = segments.split_first().unwrap();
    if rest.is_empty() {
        nodes.push(LocalNode::File {
            name: first.to_string(),
            file_type: FileType::from_name(first),
            size: file.data.len() as u64,
            metadata: file.metadata.clone(),
        });
        return;
    }

    let index = nodes
        .iter()
        .position(|n| matches!(n, LocalNode::Folder { name, .. } if name == first));
    let index = match index {
        Some(i) => i,
        None => {
            nodes.push(LocalNode::Folder {
                name: first.to_string(),
                children: Vec::new(),
            });
            nodes.len() - 1
        }
    };
    if let LocalNode::Folder { children, .. } = &mut nodes[index] {
        insert_node(children, rest, file);
    }
}

#[async_trait]
impl LocalStorage for MemoryLocal {
    async fn list_tree(&self, folder: &str) -> fs::Result<Vec<LocalNode>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StorageError::Io {
                path: PathBuf::from(folder),
                operation: "listing".to_string(),
                source: io::Error::other("disk unplugged"),
            });
        }

        let prefix = format!("{}/", folder.trim_matches('/'));
        let mut nodes = Vec::new();
        for (path, file) in self.files.lock().unwrap().iter() {
            if let Some(rel) = path.strip_prefix(&prefix) {
                let segments: Vec<&str> = rel.split('/').collect();
                insert_node(&mut nodes, &segments, file);
            }
        }
        Ok(nodes)
    }

    async fn read_file(&self, path: &str) -> fs::Result<Vec<u8>> {
        self.get(path).map(|f| f.data).ok_or_else(|| StorageError::NotFound {
            path: path.to_string(),
        })
    }

    async fn add_file(&self, path: &str, source: &Path) -> fs::Result<()> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(StorageError::Io {
                path: PathBuf::from(path),
                operation: "storing".to_string(),
                source: io::Error::other("read-only storage"),
            });
        }

        let data = std::fs::read(source).map_err(|e| StorageError::from_io_error(e, "reading", source))?;
        std::fs::remove_file(source).map_err(|e| StorageError::from_io_error(e, "moving", source))?;
        self.files.lock().unwrap().insert(
            path.to_string(),
            MemFile {
                data,
                metadata: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> fs::Result<()> {
        match self.files.lock().unwrap().remove(path) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    async fn set_metadata(&self, path: &str, key: &str, value: serde_json::Value) -> fs::Result<()> {
        let mut files = self.files.lock().unwrap();
        let file = files.get_mut(path).ok_or_else(|| StorageError::NotFound {
            path: path.to_string(),
        })?;
        file.metadata.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RemoteObject {
    pub data: Vec<u8>,
    pub tag: String,
}

/// Remote storage keyed by canonical path. Folder ids are canonical folder paths.
#[derive(Default)]
pub struct MemoryRemote {
    objects: Mutex<BTreeMap<String, RemoteObject>>,
    versions: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub downloads: Mutex<Vec<PathBuf>>,
    pub fail_listing: AtomicBool,
    pub list_delay: Mutex<Option<Duration>>,
    pub refuse_delete: Mutex<HashSet<String>>,
    pub fail_info: Mutex<HashSet<String>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object under a fresh change tag and return that tag.
    pub fn put(&self, path: &str, data: &[u8]) -> String {
        let tag = format!("v{}", self.versions.fetch_add(1, Ordering::SeqCst) + 1);
        self.objects.lock().unwrap().insert(
            canonicalize(path),
            RemoteObject {
                data: data.to_vec(),
                tag: tag.clone(),
            },
        );
        tag
    }

    pub fn put_tagged(&self, path: &str, data: &[u8], tag: &str) {
        self.objects.lock().unwrap().insert(
            canonicalize(path),
            RemoteObject {
                data: data.to_vec(),
                tag: tag.to_string(),
            },
        );
    }

    pub fn get(&self, path: &str) -> Option<RemoteObject> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    fn key(folder_id: &str, path: &str) -> String {
        canonicalize(&format!("{}/{}", folder_id, path))
    }
}

#[async_trait]
impl RemoteStorage for MemoryRemote {
    async fn list_children(&self, folder_id: &str) -> fs::Result<Vec<RemoteItem>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StorageError::Remote("service unavailable".to_string()));
        }

        let folder = canonicalize(folder_id);
        let prefix = if folder == "/" { "/".to_string() } else { format!("{}/", folder) };

        let mut items = Vec::new();
        let mut folders = Vec::new();
        for (path, object) in self.objects.lock().unwrap().iter() {
            let Some(rel) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rel.split_once('/') {
                None => items.push(RemoteItem::file(path.clone(), rel, object.tag.clone())),
                Some((name, _)) => {
                    if !folders.iter().any(|f: &String| f == name) {
                        folders.push(name.to_string());
                    }
                }
            }
        }
        for name in folders {
            items.push(RemoteItem::folder(child_path(&folder, &name), name));
        }
        Ok(items)
    }

    async fn file_info(&self, folder_id: &str, path: &str) -> fs::Result<RemoteFileInfo> {
        let key = Self::key(folder_id, path);
        if self.fail_info.lock().unwrap().contains(&key) {
            return Err(StorageError::Remote(format!("{}: access denied", key)));
        }
        let object = self.get(&key).ok_or_else(|| StorageError::NotFound { path: key.clone() })?;
        Ok(RemoteFileInfo {
            change_tag: object.tag,
            remote_id: key,
            size: object.data.len() as u64,
        })
    }

    async fn download(&self, folder_id: &str, path: &str) -> fs::Result<PathBuf> {
        let key = Self::key(folder_id, path);
        let object = self.get(&key).ok_or_else(|| StorageError::NotFound { path: key.clone() })?;

        let mut temp = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut temp, &object.data).unwrap();
        let temp_path = temp.into_temp_path().keep().unwrap();
        self.downloads.lock().unwrap().push(temp_path.clone());
        Ok(temp_path)
    }

    async fn upload(&self, folder_id: &str, path: &str, data: Vec<u8>) -> fs::Result<UploadResult> {
        let key = Self::key(folder_id, path);
        let change_tag = self.put(&key, &data);
        Ok(UploadResult {
            change_tag,
            remote_id: key,
        })
    }

    async fn delete(&self, folder_id: &str, path: &str) -> fs::Result<DeleteResponse> {
        let key = Self::key(folder_id, path);
        if self.refuse_delete.lock().unwrap().contains(&key) {
            return Ok(DeleteResponse::failed("access denied"));
        }
        match self.objects.lock().unwrap().remove(&key) {
            Some(_) => Ok(DeleteResponse::ok()),
            None => Ok(DeleteResponse::failed("item not found")),
        }
    }
}
