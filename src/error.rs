//! Error types for storage access, configuration and sync ticks.
//!
//! Storage collaborators report [`StorageError`]; reading configuration
//! reports [`ConfigError`]. A [`TickError`] is anything that aborts a whole
//! tick before a single action runs.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors reported by the local and remote storage seams.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The file or folder does not exist.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// I/O failure on the local disk.
    #[error("I/O error while {operation} {}: {source}", path.display())]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: io::Error,
    },

    /// A metadata sidecar could not be read or written.
    #[error("metadata error for {path}: {reason}")]
    Metadata { path: String, reason: String },

    /// The remote service rejected or failed a request.
    #[error("remote error: {0}")]
    Remote(String),

    /// A call did not complete within the configured limit.
    #[error("timed out after {}s while {operation}", limit.as_secs_f64())]
    Timeout { limit: Duration, operation: String },
}

impl StorageError {
    /// Build an I/O error with context, mapping `NotFound` to [`StorageError::NotFound`].
    pub fn from_io_error(err: io::Error, operation: &str, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound {
                path: path.display().to_string(),
            },
            _ => StorageError::Io {
                path,
                operation: operation.to_string(),
                source: err,
            },
        }
    }

    /// Whether this error means the target simply isn't there.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Errors found while reading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown sync mode `{0}` (expected `remote`, `local` or `bidirectional`)")]
    UnknownMode(String),

    #[error("invalid poll interval `{0}`: expected a positive whole number of seconds")]
    InvalidInterval(String),

    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Which tree a snapshot was being built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => write!(f, "local"),
            Side::Remote => write!(f, "remote"),
        }
    }
}

/// Errors that abort a tick before any action is executed.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to list {side} files: {source}")]
    Snapshot {
        side: Side,
        #[source]
        source: StorageError,
    },
}
