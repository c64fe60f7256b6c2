use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata key under which sync bookkeeping is attached to local files.
pub const SYNC_METADATA_KEY: &str = "cloud";

/// Extensions the printer host treats as machine code.
pub const MACHINE_CODE_EXTENSIONS: &[&str] = &["gcode", "gco", "g"];

/// Extensions the printer host treats as 3D models.
pub const MODEL_EXTENSIONS: &[&str] = &["stl"];

/// Dot-files and dot-folders never take part in a sync.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Declared type of a local file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    MachineCode,
    Model,
    Other,
}

impl FileType {
    pub fn from_name(name: &str) -> Self {
        let ext = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
            _ => return FileType::Other,
        };

        if MACHINE_CODE_EXTENSIONS.contains(&ext.as_str()) {
            FileType::MachineCode
        } else if MODEL_EXTENSIONS.contains(&ext.as_str()) {
            FileType::Model
        } else {
            FileType::Other
        }
    }

    pub fn is_machine_code(&self) -> bool {
        matches!(self, FileType::MachineCode)
    }
}

/// Bookkeeping written to a local file after a successful upload or download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncMetadata {
    #[serde(rename = "etag")]
    pub change_tag: String,
    #[serde(rename = "id")]
    pub remote_id: String,
}

impl SyncMetadata {
    pub fn new(change_tag: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self {
            change_tag: change_tag.into(),
            remote_id: remote_id.into(),
        }
    }
}

/// One node of a nested local listing.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalNode {
    File {
        name: String,
        file_type: FileType,
        size: u64,
        /// Namespaced metadata records attached to the file.
        metadata: BTreeMap<String, serde_json::Value>,
    },
    Folder {
        name: String,
        children: Vec<LocalNode>,
    },
}

impl LocalNode {
    pub fn name(&self) -> &str {
        match self {
            LocalNode::File { name, .. } => name,
            LocalNode::Folder { name, .. } => name,
        }
    }

    /// Sync bookkeeping for a file node, if a previous sync attached one.
    ///
    /// A present but partial record still counts: missing fields read as empty.
    pub fn sync_metadata(&self) -> Option<SyncMetadata> {
        match self {
            LocalNode::File { metadata, .. } => metadata
                .get(SYNC_METADATA_KEY)
                .and_then(|value| serde_json::from_value(value.clone()).ok()),
            LocalNode::Folder { .. } => None,
        }
    }
}

/// Kind of an item inside a remote folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteItemKind {
    File,
    Folder,
}

/// An immediate child of a remote folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    /// Opaque id; for folders this is what `list_children` takes.
    pub id: String,
    pub name: String,
    pub kind: RemoteItemKind,
    /// Change tag of a file. Empty for folders.
    pub change_tag: String,
    pub download_url: Option<String>,
}

impl RemoteItem {
    pub fn file(id: impl Into<String>, name: impl Into<String>, change_tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: RemoteItemKind::File,
            change_tag: change_tag.into(),
            download_url: None,
        }
    }

    pub fn folder(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: RemoteItemKind::Folder,
            change_tag: String::new(),
            download_url: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == RemoteItemKind::Folder
    }
}

/// Current metadata of a single remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileInfo {
    pub change_tag: String,
    pub remote_id: String,
    pub size: u64,
}

/// What the remote reports back after storing a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub change_tag: String,
    pub remote_id: String,
}

/// Response payload of a remote delete.
///
/// A transport failure is an `Err`; a service that answers but refuses the
/// delete reports it here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteResponse {
    pub error: Option<String>,
}

impl DeleteResponse {
    pub fn ok() -> Self {
        Self { error: None }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
        }
    }
}
