//! Sync engine: one tick from snapshots to executed actions.
//!
//! The engine holds no state between ticks. Everything it compares is
//! rebuilt from the two storages every time.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::error::{Side, TickError};
use crate::fs::{LocalStorage, RemoteStorage};
use crate::sync::config::{SyncConfig, SyncMode};
use crate::sync::executor::{bounded, ActionExecutor, TickStats};
use crate::sync::plan::{plan, SyncAction};
use crate::sync::snapshot::{local_snapshot, remote_snapshot, Snapshot};

/// Result of one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub mode: SyncMode,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Actions that were planned, in execution order.
    pub actions: Vec<SyncAction>,
    pub stats: TickStats,
}

/// Sync engine for a local and a remote storage.
pub struct SyncEngine {
    local: Arc<dyn LocalStorage>,
    remote: Arc<dyn RemoteStorage>,
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(local: Arc<dyn LocalStorage>, remote: Arc<dyn RemoteStorage>) -> Self {
        Self { local, remote }
    }

    pub fn local(&self) -> &Arc<dyn LocalStorage> {
        &self.local
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStorage> {
        &self.remote
    }

    /// Build both snapshots, local first.
    pub async fn snapshots(&self, config: &SyncConfig) -> Result<(Snapshot, Snapshot), TickError> {
        let nodes = self
            .local
            .list_tree(&config.local_folder)
            .await
            .map_err(|source| TickError::Snapshot {
                side: Side::Local,
                source,
            })?;
        let local = local_snapshot(&nodes, config.max_depth);

        let local_storage = &self.local;
        let accepts = move |name: &str| local_storage.is_valid_file_type(name);
        let remote = bounded(
            config.remote_timeout,
            "listing remote files",
            remote_snapshot(&*self.remote, &config.remote_folder_id, config.max_depth, &accepts),
        )
        .await
        .map_err(|source| TickError::Snapshot {
            side: Side::Remote,
            source,
        })?;

        Ok((local, remote))
    }

    /// Plan a tick without executing anything.
    pub async fn preview(&self, config: &SyncConfig) -> Result<Vec<SyncAction>, TickError> {
        let (local, remote) = self.snapshots(config).await?;
        Ok(plan(&local, &remote, config.mode))
    }

    /// Run one tick: snapshot, plan, execute.
    ///
    /// Fails only when a snapshot can't be built; action failures end up in
    /// the report's stats.
    pub async fn tick(&self, config: &SyncConfig) -> Result<TickReport, TickError> {
        let started_at = Utc::now();
        let start = Instant::now();

        let (local, remote) = self.snapshots(config).await.inspect_err(|e| {
            error!("Sync aborted: {}", e);
        })?;

        let actions = plan(&local, &remote, config.mode);
        info!(
            "Syncing {} ({} local, {} remote files): {} actions",
            config.mode.description(),
            local.len(),
            remote.len(),
            actions.len()
        );
        for action in &actions {
            debug!("Planned {}", action);
        }

        let executor = ActionExecutor::new(&*self.local, &*self.remote, config);
        let stats = executor.execute_all(&actions).await;

        let duration = start.elapsed();
        info!(
            "Sync run finished in {:.2}s: {} uploaded, {} downloaded, {} deleted locally, {} deleted remotely, {} failed",
            duration.as_secs_f64(),
            stats.uploaded,
            stats.downloaded,
            stats.deleted_local,
            stats.deleted_remote,
            stats.failed_count()
        );

        Ok(TickReport {
            mode: config.mode,
            started_at,
            duration,
            actions,
            stats,
        })
    }
}
