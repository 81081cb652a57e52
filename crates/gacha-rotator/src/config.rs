//! Rotation client configuration, read from a JSON file.
//!
//! ```json
//! {
//!   "remote_host": "wall.example.org",
//!   "remote_user": "wallpaper",
//!   "remote_directory": "/srv/wallpaper/uploads",
//!   "local_directory": "~/Pictures/wallpapers",
//!   "interval_minutes": 30,
//!   "rsync_port": 22,
//!   "log_level": "INFO",
//!   "hyprpaper_monitors": ["all"]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use gacha_shared::constants::{
    CLIENT_LOG_FILE, DEFAULT_INTERVAL_MINUTES, DEFAULT_RSYNC_PORT, HISTORY_DB_FILE,
};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "wallpaper-manager-config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Which monitors receive the wallpaper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorTargets {
    /// Every monitor reported by the compositor.
    All,
    Named(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatorConfig {
    pub remote_host: String,
    pub remote_user: String,
    pub remote_directory: String,
    /// Where synced images, the history database and the log live.
    pub local_directory: PathBuf,
    pub interval_minutes: u64,
    pub rsync_port: u16,
    pub log_level: LogLevel,
    pub monitors: MonitorTargets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARNING" | "WARN" => Some(LogLevel::Warning),
            "ERROR" | "CRITICAL" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// `EnvFilter` directive for this level.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// The file as written by the user. Every field is optional here so that
/// a missing one is reported by name.
#[derive(Deserialize)]
struct RawConfig {
    remote_host: Option<String>,
    remote_user: Option<String>,
    remote_directory: Option<String>,
    local_directory: Option<String>,
    interval_minutes: Option<u64>,
    rsync_port: Option<u16>,
    log_level: Option<String>,
    hyprpaper_monitors: Option<Vec<String>>,
}

impl RotatorConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text)?;

        let remote_host = required(raw.remote_host, "remote_host")?;
        let remote_user = required(raw.remote_user, "remote_user")?;
        let remote_directory = required(raw.remote_directory, "remote_directory")?;
        let local_directory = expand_home(&required(raw.local_directory, "local_directory")?);

        let interval_minutes = raw.interval_minutes.unwrap_or(DEFAULT_INTERVAL_MINUTES);
        if interval_minutes == 0 {
            return Err(ConfigError::Invalid {
                key: "interval_minutes",
                reason: "must be at least 1".into(),
            });
        }

        let log_level = match raw.log_level {
            None => LogLevel::Info,
            Some(level) => LogLevel::parse(&level).ok_or_else(|| ConfigError::Invalid {
                key: "log_level",
                reason: format!("unknown level {level:?}"),
            })?,
        };

        let monitors = match raw.hyprpaper_monitors {
            None => MonitorTargets::All,
            Some(list) if list.iter().any(|m| m == "all") => MonitorTargets::All,
            Some(list) if list.is_empty() => {
                return Err(ConfigError::Invalid {
                    key: "hyprpaper_monitors",
                    reason: "list is empty".into(),
                })
            }
            Some(list) => MonitorTargets::Named(list),
        };

        Ok(Self {
            remote_host,
            remote_user,
            remote_directory,
            local_directory,
            interval_minutes,
            rsync_port: raw.rsync_port.unwrap_or(DEFAULT_RSYNC_PORT),
            log_level,
            monitors,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    pub fn history_db_path(&self) -> PathBuf {
        self.local_directory.join(HISTORY_DB_FILE)
    }

    pub fn log_file_name(&self) -> &'static str {
        CLIENT_LOG_FILE
    }
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

/// Expand a leading `~` to the user's home directory.
fn expand_home(raw: &str) -> PathBuf {
    let rest = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(raw),
    };

    match directories::BaseDirs::new() {
        Some(dirs) if rest.is_empty() => dirs.home_dir().to_path_buf(),
        Some(dirs) => dirs.home_dir().join(rest),
        None => {
            tracing::warn!(path = raw, "No home directory found, using path as given");
            PathBuf::from(raw)
        }
    }
}
