//! Diff planning: which actions bring two snapshots in line for a sync mode.
//!
//! Planning is pure. Remote paths are visited first, in path order, then the
//! local paths the remote side doesn't have. Every path appears at most once.
//!
//! A local change tag is the only evidence that a file was synced before, and
//! tag equality the only evidence that nothing changed since.

use std::fmt;

use crate::sync::config::SyncMode;
use crate::sync::snapshot::{FileRecord, Snapshot};

/// Action to take for a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncAction {
    /// Copy the local file to the remote.
    Upload { path: String },
    /// Copy the remote file to local storage.
    Download { path: String },
    /// Delete the local file.
    DeleteLocal { path: String },
    /// Delete the remote file.
    DeleteRemote { path: String },
}

/// Kind of a [`SyncAction`], without its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Upload,
    Download,
    DeleteLocal,
    DeleteRemote,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Upload => "upload",
            ActionKind::Download => "download",
            ActionKind::DeleteLocal => "delete-local",
            ActionKind::DeleteRemote => "delete-remote",
        };
        f.write_str(name)
    }
}

impl SyncAction {
    pub fn upload(path: impl Into<String>) -> Self {
        Self::Upload { path: path.into() }
    }

    pub fn download(path: impl Into<String>) -> Self {
        Self::Download { path: path.into() }
    }

    pub fn delete_local(path: impl Into<String>) -> Self {
        Self::DeleteLocal { path: path.into() }
    }

    pub fn delete_remote(path: impl Into<String>) -> Self {
        Self::DeleteRemote { path: path.into() }
    }

    /// Get the path associated with this action.
    pub fn path(&self) -> &str {
        match self {
            Self::Upload { path } => path,
            Self::Download { path } => path,
            Self::DeleteLocal { path } => path,
            Self::DeleteRemote { path } => path,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Upload { .. } => ActionKind::Upload,
            Self::Download { .. } => ActionKind::Download,
            Self::DeleteLocal { .. } => ActionKind::DeleteLocal,
            Self::DeleteRemote { .. } => ActionKind::DeleteRemote,
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.path())
    }
}

/// Compute the actions that satisfy `mode` for the given snapshots.
pub fn plan(local: &Snapshot, remote: &Snapshot, mode: SyncMode) -> Vec<SyncAction> {
    match mode {
        SyncMode::Bidirectional => plan_bidirectional(local, remote),
        SyncMode::LocalToRemote => plan_local_authoritative(local, remote),
        SyncMode::RemoteToLocal => plan_remote_authoritative(local, remote),
    }
}

/// Both sides hold the same tag, and the local one was written by a sync.
fn tags_match(local: &FileRecord, remote: &FileRecord) -> bool {
    local.change_tag.is_some() && local.change_tag == remote.change_tag
}

fn plan_bidirectional(local: &Snapshot, remote: &Snapshot) -> Vec<SyncAction> {
    let mut actions = Vec::new();

    for remote_file in remote.iter() {
        match local.get(&remote_file.path) {
            None => actions.push(SyncAction::download(&remote_file.path)),
            Some(local_file) => {
                // Only a known, different tag means the remote changed. Anything
                // else, including equal tags, pushes the local copy.
                if local_file.is_tracked() && local_file.change_tag != remote_file.change_tag {
                    actions.push(SyncAction::download(&remote_file.path));
                } else {
                    actions.push(SyncAction::upload(&remote_file.path));
                }
            }
        }
    }

    for local_file in local.iter().filter(|f| !remote.contains(&f.path)) {
        if local_file.is_tracked() {
            // Synced before and now gone remotely
            actions.push(SyncAction::delete_local(&local_file.path));
        } else {
            actions.push(SyncAction::upload(&local_file.path));
        }
    }

    actions
}

fn plan_local_authoritative(local: &Snapshot, remote: &Snapshot) -> Vec<SyncAction> {
    let mut actions = Vec::new();

    for remote_file in remote.iter() {
        match local.get(&remote_file.path) {
            Some(local_file) if tags_match(local_file, remote_file) => {}
            Some(_) => actions.push(SyncAction::upload(&remote_file.path)),
            None => actions.push(SyncAction::delete_remote(&remote_file.path)),
        }
    }

    for local_file in local.iter().filter(|f| !remote.contains(&f.path)) {
        actions.push(SyncAction::upload(&local_file.path));
    }

    actions
}

fn plan_remote_authoritative(local: &Snapshot, remote: &Snapshot) -> Vec<SyncAction> {
    let mut actions = Vec::new();

    for remote_file in remote.iter() {
        match local.get(&remote_file.path) {
            Some(local_file) if tags_match(local_file, remote_file) => {}
            _ => actions.push(SyncAction::download(&remote_file.path)),
        }
    }

    // Local-only files never synced are left alone
    for local_file in local.iter().filter(|f| !remote.contains(&f.path)) {
        if local_file.is_tracked() {
            actions.push(SyncAction::delete_local(&local_file.path));
        }
    }

    actions
}
