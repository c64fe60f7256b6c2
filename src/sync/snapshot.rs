//! Flattened, depth-bounded views of the local and remote trees.
//!
//! Both walks use an explicit stack. A folder found at `max_depth` is not
//! entered; the warning naming it is the only trace of what was skipped.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::fs::path::child_path;
use crate::fs::{is_hidden, LocalNode, RemoteStorage, Result};

/// One file as seen by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Canonical path, e.g. `/parts/bracket.gcode`.
    pub path: String,
    /// Remote change tag; on the local side only present once a sync wrote it.
    pub change_tag: Option<String>,
    pub remote_id: Option<String>,
}

impl FileRecord {
    /// A local file no sync has touched yet.
    pub fn untracked(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            change_tag: None,
            remote_id: None,
        }
    }

    pub fn tagged(path: impl Into<String>, change_tag: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            change_tag: Some(change_tag.into()),
            remote_id: None,
        }
    }

    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }

    /// Whether a previous sync recorded a change tag for this file.
    pub fn is_tracked(&self) -> bool {
        self.change_tag.is_some()
    }
}

/// Canonical path -> record, ordered by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    files: BTreeMap<String, FileRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Records in path order.
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    fn insert(&mut self, record: FileRecord) {
        self.files.insert(record.path.clone(), record);
    }
}

impl FromIterator<FileRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = FileRecord>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}

/// Flatten a nested local listing.
///
/// Only machine-code files are kept; hidden files and folders are skipped. A
/// file carries the change tag and remote id of its sync metadata when it has
/// any.
pub fn local_snapshot(nodes: &[LocalNode], max_depth: usize) -> Snapshot {
    let mut snapshot = Snapshot::new();
    let mut to_visit: Vec<(&[LocalNode], usize, String)> = vec![(nodes, 0, "/".to_string())];

    while let Some((children, depth, folder_path)) = to_visit.pop() {
        for node in children {
            if is_hidden(node.name()) {
                continue;
            }
            let path = child_path(&folder_path, node.name());

            match node {
                LocalNode::File { file_type, .. } => {
                    if !file_type.is_machine_code() {
                        continue;
                    }
                    let record = match node.sync_metadata() {
                        Some(meta) => FileRecord {
                            path,
                            change_tag: Some(meta.change_tag),
                            remote_id: Some(meta.remote_id),
                        },
                        None => FileRecord::untracked(path),
                    };
                    snapshot.insert(record);
                }
                LocalNode::Folder { children, .. } => {
                    if depth < max_depth {
                        to_visit.push((children.as_slice(), depth + 1, path));
                    } else {
                        warn!("Reached max depth of sub-folders, not going further into {}", path);
                    }
                }
            }
        }
    }

    debug!("Local snapshot: {} files", snapshot.len());
    snapshot
}

/// Walk a remote folder and flatten it.
///
/// Files are kept when `accepts` approves of their name. Hidden folders are
/// not entered. Any listing failure aborts the whole walk.
pub async fn remote_snapshot(
    remote: &dyn RemoteStorage,
    folder_id: &str,
    max_depth: usize,
    accepts: &(dyn Fn(&str) -> bool + Send + Sync),
) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new();
    let mut to_scan = vec![(folder_id.to_string(), 0usize, "/".to_string())];

    while let Some((current_id, depth, folder_path)) = to_scan.pop() {
        let items = remote.list_children(&current_id).await?;

        for item in items {
            let path = child_path(&folder_path, &item.name);

            if item.is_folder() {
                if is_hidden(&item.name) {
                    continue;
                }
                if depth < max_depth {
                    to_scan.push((item.id, depth + 1, path));
                } else {
                    warn!("Reached max depth of sub-folders, not going further into {}", path);
                }
            } else if accepts(&item.name) {
                snapshot.insert(FileRecord::tagged(path, item.change_tag).with_remote_id(item.id));
            }
        }
    }

    debug!("Remote snapshot: {} files", snapshot.len());
    Ok(snapshot)
}
