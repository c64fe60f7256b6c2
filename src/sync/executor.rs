//! Applies planned actions one at a time.
//!
//! A failed action is logged and counted; it never stops the ones after it.

use anyhow::{bail, Context};
use humansize::{format_size, BINARY};
use std::future::Future;
use std::time::Duration;
use tempfile::TempPath;
use tracing::{debug, error, info, warn};

use crate::error::StorageError;
use crate::fs::path::local_path;
use crate::fs::{self, LocalStorage, RemoteStorage, SyncMetadata, SYNC_METADATA_KEY};
use crate::sync::config::SyncConfig;
use crate::sync::plan::{ActionKind, SyncAction};

/// An action that did not complete.
#[derive(Debug, Clone)]
pub struct FailedAction {
    pub action: SyncAction,
    /// Rendered error chain.
    pub error: String,
}

/// Outcome counters of one tick.
#[derive(Debug, Clone, Default)]
pub struct TickStats {
    pub uploaded: usize,
    pub downloaded: usize,
    pub deleted_local: usize,
    pub deleted_remote: usize,
    pub failed: Vec<FailedAction>,
}

impl TickStats {
    fn record_success(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::Upload => self.uploaded += 1,
            ActionKind::Download => self.downloaded += 1,
            ActionKind::DeleteLocal => self.deleted_local += 1,
            ActionKind::DeleteRemote => self.deleted_remote += 1,
        }
    }

    /// Number of actions that completed.
    pub fn succeeded(&self) -> usize {
        self.uploaded + self.downloaded + self.deleted_local + self.deleted_remote
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run `fut`, giving up after `limit` when one is set.
pub(crate) async fn bounded<T, F>(limit: Option<Duration>, operation: &str, fut: F) -> fs::Result<T>
where
    F: Future<Output = fs::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StorageError::Timeout {
                limit,
                operation: operation.to_string(),
            })?,
        None => fut.await,
    }
}

/// Executes sync actions against a pair of storages.
pub struct ActionExecutor<'a> {
    local: &'a dyn LocalStorage,
    remote: &'a dyn RemoteStorage,
    remote_folder_id: &'a str,
    local_folder: &'a str,
    timeout: Option<Duration>,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(local: &'a dyn LocalStorage, remote: &'a dyn RemoteStorage, config: &'a SyncConfig) -> Self {
        Self {
            local,
            remote,
            remote_folder_id: &config.remote_folder_id,
            local_folder: &config.local_folder,
            timeout: config.remote_timeout,
        }
    }

    /// Execute every action in order and collect the outcome.
    pub async fn execute_all(&self, actions: &[SyncAction]) -> TickStats {
        let mut stats = TickStats::default();

        for action in actions {
            match self.execute(action).await {
                Ok(()) => stats.record_success(action.kind()),
                Err(e) => {
                    error!("Sync action {} failed for {}: {:#}", action.kind(), action.path(), e);
                    stats.failed.push(FailedAction {
                        action: action.clone(),
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        stats
    }

    /// Execute a single action.
    pub async fn execute(&self, action: &SyncAction) -> anyhow::Result<()> {
        debug!("Executing {}", action);
        match action {
            SyncAction::Upload { path } => self.upload(path).await,
            SyncAction::Download { path } => self.download(path).await,
            SyncAction::DeleteLocal { path } => self.delete_local(path).await,
            SyncAction::DeleteRemote { path } => self.delete_remote(path).await,
        }
    }

    async fn upload(&self, path: &str) -> anyhow::Result<()> {
        let local = local_path(self.local_folder, path);
        let data = self
            .local
            .read_file(&local)
            .await
            .with_context(|| format!("Failed to read {}", self.local.display_path(&local)))?;
        let size = data.len();

        let uploaded = bounded(
            self.timeout,
            "uploading",
            self.remote.upload(self.remote_folder_id, path, data),
        )
        .await
        .with_context(|| format!("Failed to upload {}", self.remote.display_path(self.remote_folder_id, path)))?;

        self.record_metadata(&local, SyncMetadata::new(uploaded.change_tag, uploaded.remote_id))
            .await?;

        info!(
            "Uploaded {} ({})",
            self.remote.display_path(self.remote_folder_id, path),
            format_size(size, BINARY)
        );
        Ok(())
    }

    async fn download(&self, path: &str) -> anyhow::Result<()> {
        let local = local_path(self.local_folder, path);

        let remote_info = bounded(
            self.timeout,
            "fetching file info",
            self.remote.file_info(self.remote_folder_id, path),
        )
        .await
        .with_context(|| format!("Failed to fetch info for {}", path))?;

        let downloaded = bounded(
            self.timeout,
            "downloading",
            self.remote.download(self.remote_folder_id, path),
        )
        .await
        .with_context(|| format!("Failed to download {}", path))?;

        // Removed when dropped, whatever happens below
        let temp = match TempPath::try_from_path(&downloaded) {
            Ok(temp) => temp,
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&downloaded).await {
                    warn!("Failed to remove download {}: {}", downloaded.display(), remove_err);
                }
                return Err(e).with_context(|| format!("Failed to stage download {}", downloaded.display()));
            }
        };

        self.local
            .add_file(&local, &temp)
            .await
            .with_context(|| format!("Failed to store {}", self.local.display_path(&local)))?;

        if temp.exists() {
            warn!("Temporary download {} still exists after storing {}", temp.display(), local);
        }
        drop(temp);

        self.record_metadata(&local, SyncMetadata::new(remote_info.change_tag, remote_info.remote_id))
            .await?;

        info!(
            "Downloaded {} ({})",
            self.local.display_path(&local),
            format_size(remote_info.size, BINARY)
        );
        Ok(())
    }

    async fn delete_local(&self, path: &str) -> anyhow::Result<()> {
        let local = local_path(self.local_folder, path);

        match self.local.remove_file(&local).await {
            Ok(()) => info!("Deleted local {}", self.local.display_path(&local)),
            Err(e) if e.is_not_found() => debug!("Local {} already gone", local),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to delete {}", self.local.display_path(&local)));
            }
        }
        Ok(())
    }

    async fn delete_remote(&self, path: &str) -> anyhow::Result<()> {
        let target = self.remote.display_path(self.remote_folder_id, path);

        let response = bounded(
            self.timeout,
            "deleting",
            self.remote.delete(self.remote_folder_id, path),
        )
        .await
        .with_context(|| format!("Failed to delete {}", target))?;

        if let Some(reason) = response.error {
            bail!("Remote refused to delete {}: {}", target, reason);
        }

        info!("Deleted remote {}", target);
        Ok(())
    }

    async fn record_metadata(&self, local: &str, meta: SyncMetadata) -> anyhow::Result<()> {
        let value = serde_json::to_value(&meta).context("Failed to encode sync metadata")?;
        self.local
            .set_metadata(local, SYNC_METADATA_KEY, value)
            .await
            .with_context(|| format!("Failed to record sync metadata for {}", local))
    }
}
