//! Process configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.mirror/
//!   config.yaml   (this module)
//!   files.json    (see [`crate::file_table`])
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};

/// Default HTTP timeout applied to every request issued through the shared agent.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Size a log file may reach before it is rotated (10 MiB).
pub const DEFAULT_LOG_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Rotated log files kept next to the live one.
pub const DEFAULT_LOG_KEEP: usize = 5;

/// Root of the YAML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Directory all mirrored files are rooted under.
    pub storage_path: PathBuf,
    /// Optional log file; log lines go to stdout and this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub log_rotation: LogRotation,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Size-based rotation applied to `log_file` when it is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRotation {
    #[serde(default = "default_log_max_bytes")]
    pub max_bytes: u64,
    /// Numbered backups to keep; 0 discards the old file.
    #[serde(default = "default_log_keep")]
    pub keep: usize,
}

impl Default for LogRotation {
    fn default() -> Self {
        Self {
            max_bytes: default_log_max_bytes(),
            keep: default_log_keep(),
        }
    }
}

/// Settings for the shared HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl MirrorConfig {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            log_file: None,
            log_rotation: LogRotation::default(),
            http: HttpConfig::default(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_log_max_bytes() -> u64 {
    DEFAULT_LOG_MAX_BYTES
}

fn default_log_keep() -> usize {
    DEFAULT_LOG_KEEP
}

fn default_user_agent() -> String {
    concat!("mirror/", env!("CARGO_PKG_VERSION")).to_string()
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.mirror/`
pub fn mirror_root(home: &Path) -> PathBuf {
    home.join(".mirror")
}

/// `<home>/.mirror/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    mirror_root(home).join("config.yaml")
}

/// The user's home directory, root of `~/.mirror/`.
pub fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load `<home>/.mirror/config.yaml`.
///
/// Returns `CoreError::ConfigNotFound` if absent,
/// `CoreError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<MirrorConfig, CoreError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(CoreError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<MirrorConfig, CoreError> {
    load_at(&home()?)
}

/// Atomically save the config to `<home>/.mirror/config.yaml`.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `rename`.
pub fn save_at(home: &Path, config: &MirrorConfig) -> Result<(), CoreError> {
    let dir = mirror_root(home);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let path = config_path_at(home);
    let tmp = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &MirrorConfig) -> Result<(), CoreError> {
    save_at(&home()?, config)
}
