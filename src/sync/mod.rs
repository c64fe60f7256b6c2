//! Sync module
//!
//! Keeps a local folder and a remote folder in line: snapshots of both
//! trees, a plan of actions for the configured mode, and a scheduler that
//! runs the whole thing on an interval.

pub mod config;
pub mod engine;
pub mod executor;
pub mod plan;
pub mod scheduler;
pub mod snapshot;

pub use config::{ConfigSource, RawConfig, SyncConfig, SyncMode, TomlConfigFile};
pub use engine::{SyncEngine, TickReport};
pub use executor::{ActionExecutor, FailedAction, TickStats};
pub use plan::{plan, ActionKind, SyncAction};
pub use scheduler::{SchedulerHooks, SchedulerState, SyncScheduler, TickOutcome};
pub use snapshot::{local_snapshot, remote_snapshot, FileRecord, Snapshot};
