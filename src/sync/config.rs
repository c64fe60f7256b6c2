//! Sync configuration and the sources it is re-read from on every tick.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default poll interval (one hour).
pub const DEFAULT_INTERVAL_SECS: u64 = 60 * 60;

/// Default local folder the remote tree is mirrored into.
pub const DEFAULT_LOCAL_FOLDER: &str = "cloud";

/// Default maximum folder depth walked on either side.
pub const DEFAULT_MAX_DEPTH: usize = 4;

/// Direction changes are allowed to flow in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Local is authoritative: never downloads.
    LocalToRemote,
    /// Remote is authoritative: never uploads.
    #[default]
    RemoteToLocal,
    /// Changes flow both ways.
    Bidirectional,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalToRemote => "local",
            Self::RemoteToLocal => "remote",
            Self::Bidirectional => "bidirectional",
        }
    }

    /// Get a human-readable description of the mode.
    pub fn description(&self) -> &'static str {
        match self {
            Self::LocalToRemote => "local -> remote (local is authoritative)",
            Self::RemoteToLocal => "remote -> local (remote is authoritative)",
            Self::Bidirectional => "two-way",
        }
    }
}

impl FromStr for SyncMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "local-to-remote" | "local_to_remote" => Ok(Self::LocalToRemote),
            "remote" | "remote-to-local" | "remote_to_local" => Ok(Self::RemoteToLocal),
            "bidirectional" | "two-way" | "two" => Ok(Self::Bidirectional),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated configuration for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub mode: SyncMode,
    /// Longest wait between two ticks.
    pub poll_interval: Duration,
    /// Remote folder the local folder mirrors.
    pub remote_folder_id: String,
    /// Local folder, relative to the local storage root.
    pub local_folder: String,
    /// Deepest folder level walked; folders below it are skipped.
    pub max_depth: usize,
    /// Upper bound for each remote call. `None` waits as long as the remote does.
    pub remote_timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            poll_interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            remote_folder_id: String::new(),
            local_folder: DEFAULT_LOCAL_FOLDER.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            remote_timeout: None,
        }
    }
}

/// Poll interval as written by a user: a number or a string holding one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IntervalSetting {
    Seconds(u64),
    Text(String),
}

impl Default for IntervalSetting {
    fn default() -> Self {
        IntervalSetting::Seconds(DEFAULT_INTERVAL_SECS)
    }
}

/// Configuration as stored, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub mode: String,
    pub interval: IntervalSetting,
    pub remote_folder: String,
    pub local_folder: String,
    pub max_depth: usize,
    /// Seconds; absent or zero means no limit.
    pub remote_timeout: Option<u64>,
}

impl Default for RawConfig {
    fn default() -> Self {
        let defaults = SyncConfig::default();
        Self {
            mode: defaults.mode.as_str().to_string(),
            interval: IntervalSetting::default(),
            remote_folder: defaults.remote_folder_id,
            local_folder: defaults.local_folder,
            max_depth: defaults.max_depth,
            remote_timeout: None,
        }
    }
}

impl RawConfig {
    pub fn validate(&self) -> Result<SyncConfig, ConfigError> {
        let mode = self.mode.parse::<SyncMode>()?;

        let seconds = match &self.interval {
            IntervalSetting::Seconds(secs) => *secs,
            IntervalSetting::Text(text) => text
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidInterval(text.clone()))?,
        };
        if seconds == 0 {
            return Err(ConfigError::InvalidInterval(seconds.to_string()));
        }

        Ok(SyncConfig {
            mode,
            poll_interval: Duration::from_secs(seconds),
            remote_folder_id: self.remote_folder.clone(),
            local_folder: self.local_folder.trim_matches('/').to_string(),
            max_depth: self.max_depth,
            remote_timeout: self
                .remote_timeout
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }
}

/// Something the scheduler can ask for the current configuration.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<SyncConfig, ConfigError>;
}

impl ConfigSource for SyncConfig {
    fn load(&self) -> Result<SyncConfig, ConfigError> {
        Ok(self.clone())
    }
}

impl<F> ConfigSource for F
where
    F: Fn() -> Result<SyncConfig, ConfigError> + Send + Sync,
{
    fn load(&self) -> Result<SyncConfig, ConfigError> {
        self()
    }
}

/// A TOML file read afresh on every `load`.
///
/// ```toml
/// mode = "bidirectional"
/// interval = 600
/// remote_folder = "printer/"
/// local_folder = "cloud"
/// max_depth = 4
/// ```
#[derive(Debug, Clone)]
pub struct TomlConfigFile {
    path: PathBuf,
}

impl TomlConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl ConfigSource for TomlConfigFile {
    fn load(&self) -> Result<SyncConfig, ConfigError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;

        let raw: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })?;

        raw.validate()
    }
}

/// Default config location: `<config dir>/ferry/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ferry").join("config.toml"))
}
