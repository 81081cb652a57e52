//! Server configuration loaded from environment variables.
//!
//! Every setting has a default except the identity provider credentials and
//! the allowed server list; [`ServerConfig::validate`] reports those.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use gacha_shared::constants::{
    DEFAULT_COOLDOWN_MINUTES, DEFAULT_EXTENSIONS, DEFAULT_HTTP_PORT, DEFAULT_MAX_FILE_SIZE_MB,
    DEFAULT_SESSION_MAX_AGE_HOURS,
};
use thiserror::Error;

const MAX_SESSION_MAX_AGE_HOURS: i64 = 10 * 366 * 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database holding identities, uploads and sessions.
    /// Env: `DATABASE_PATH`
    /// Default: `./wallpaper.db`
    pub database_path: PathBuf,

    /// Directory accepted files are written to.
    /// Env: `UPLOAD_DIRECTORY`
    /// Default: `./uploads`
    pub upload_directory: PathBuf,

    /// Minimum interval between two uploads by the same identity.
    /// Env: `UPLOAD_COOLDOWN_MINUTES`
    /// Default: 60 minutes
    pub upload_cooldown: Duration,

    /// Maximum upload size in bytes.
    /// Env: `MAX_FILE_SIZE_MB`
    /// Default: 50 MiB
    pub max_file_size: u64,

    /// Accepted file extensions, lowercase without the dot.
    /// Env: `ALLOWED_EXTENSIONS` (comma separated)
    /// Default: `png,jpg,jpeg,jxl,webp`
    pub allowed_extensions: Vec<String>,

    /// Env: `DISCORD_CLIENT_ID` (required)
    pub discord_client_id: String,

    /// Env: `DISCORD_CLIENT_SECRET` (required)
    pub discord_client_secret: String,

    /// Env: `DISCORD_REDIRECT_URI` (required)
    pub discord_redirect_uri: String,

    /// Discord servers whose members may log in.
    /// Env: `ALLOWED_SERVER_IDS` (comma separated, at least one)
    pub allowed_server_ids: Vec<String>,

    /// Session lifetime.
    /// Env: `SESSION_MAX_AGE_HOURS`
    /// Default: 168 (7 days)
    pub session_max_age: chrono::Duration,

    /// Whether cookies carry the `Secure` attribute.
    /// Env: `COOKIE_SECURE` (true/false)
    /// Default: `true`
    pub cookie_secure: bool,

    /// Directory served for everything that is not an API route.
    /// Env: `STATIC_DIR`
    /// Default: none
    pub static_dir: Option<PathBuf>,

    /// Where the browser lands after a successful login.
    /// Env: `POST_LOGIN_REDIRECT`
    /// Default: `/upload`
    pub post_login_redirect: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./wallpaper.db"),
            upload_directory: PathBuf::from("./uploads"),
            upload_cooldown: Duration::from_secs(DEFAULT_COOLDOWN_MINUTES * 60),
            max_file_size: DEFAULT_MAX_FILE_SIZE_MB * 1024 * 1024,
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            discord_client_id: String::new(),
            discord_client_secret: String::new(),
            discord_redirect_uri: String::new(),
            allowed_server_ids: Vec::new(),
            session_max_age: chrono::Duration::hours(DEFAULT_SESSION_MAX_AGE_HOURS),
            cookie_secure: true,
            static_dir: None,
            post_login_redirect: "/upload".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = parse_var(&var, "HTTP_ADDR") {
            config.http_addr = addr;
        }

        if let Some(path) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(path) = var("UPLOAD_DIRECTORY") {
            config.upload_directory = PathBuf::from(path);
        }

        if let Some(minutes) = parse_var::<u64>(&var, "UPLOAD_COOLDOWN_MINUTES") {
            match minutes.checked_mul(60) {
                Some(secs) => config.upload_cooldown = Duration::from_secs(secs),
                None => out_of_range("UPLOAD_COOLDOWN_MINUTES", minutes),
            }
        }

        if let Some(mb) = parse_var::<u64>(&var, "MAX_FILE_SIZE_MB") {
            match mb.checked_mul(1024 * 1024) {
                Some(bytes) => config.max_file_size = bytes,
                None => out_of_range("MAX_FILE_SIZE_MB", mb),
            }
        }

        if let Some(list) = var("ALLOWED_EXTENSIONS") {
            config.allowed_extensions = split_list(&list)
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect();
        }

        if let Some(id) = var("DISCORD_CLIENT_ID") {
            config.discord_client_id = id;
        }

        if let Some(secret) = var("DISCORD_CLIENT_SECRET") {
            config.discord_client_secret = secret;
        }

        if let Some(uri) = var("DISCORD_REDIRECT_URI") {
            config.discord_redirect_uri = uri;
        }

        if let Some(list) = var("ALLOWED_SERVER_IDS") {
            config.allowed_server_ids = split_list(&list);
        }

        if let Some(hours) = parse_var::<i64>(&var, "SESSION_MAX_AGE_HOURS") {
            match session_max_age(hours) {
                Some(age) => config.session_max_age = age,
                None => out_of_range("SESSION_MAX_AGE_HOURS", hours),
            }
        }

        if let Some(val) = var("COOKIE_SECURE") {
            config.cookie_secure = val != "false" && val != "0";
        }

        if let Some(dir) = var("STATIC_DIR") {
            if !dir.is_empty() {
                config.static_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(target) = var("POST_LOGIN_REDIRECT") {
            config.post_login_redirect = target;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// Check the settings that have no usable default.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord_client_id.is_empty() {
            return Err(ConfigError::Missing("DISCORD_CLIENT_ID"));
        }
        if self.discord_client_secret.is_empty() {
            return Err(ConfigError::Missing("DISCORD_CLIENT_SECRET"));
        }
        if self.discord_redirect_uri.is_empty() {
            return Err(ConfigError::Missing("DISCORD_REDIRECT_URI"));
        }
        if self.allowed_server_ids.is_empty() {
            return Err(ConfigError::Missing("ALLOWED_SERVER_IDS"));
        }
        if self.allowed_extensions.is_empty() {
            return Err(ConfigError::Invalid {
                key: "ALLOWED_EXTENSIONS",
                reason: "at least one extension is required".into(),
            });
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_FILE_SIZE_MB",
                reason: "must be greater than zero".into(),
            });
        }
        if self.session_max_age <= chrono::Duration::zero() {
            return Err(ConfigError::Invalid {
                key: "SESSION_MAX_AGE_HOURS",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

// The client secret must never reach the logs.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("upload_directory", &self.upload_directory)
            .field("upload_cooldown", &self.upload_cooldown)
            .field("max_file_size", &self.max_file_size)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("discord_client_id", &self.discord_client_id)
            .field("discord_client_secret", &"<redacted>")
            .field("discord_redirect_uri", &self.discord_redirect_uri)
            .field("allowed_server_ids", &self.allowed_server_ids)
            .field("session_max_age", &self.session_max_age)
            .field("cookie_secure", &self.cookie_secure)
            .field("static_dir", &self.static_dir)
            .field("post_login_redirect", &self.post_login_redirect)
            .finish()
    }
}

/// Parse a variable, keeping the default (and warning) when it is malformed.
fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = var(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "Invalid value, using default");
            None
        }
    }
}

/// Session lifetimes are kept between one hour and ten years.
fn session_max_age(hours: i64) -> Option<chrono::Duration> {
    if !(1..=MAX_SESSION_MAX_AGE_HOURS).contains(&hours) {
        return None;
    }
    chrono::Duration::try_hours(hours)
}

fn out_of_range(key: &str, value: impl fmt::Display) {
    tracing::warn!(key, value = %value, "Value out of range, using default");
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
