/// Application name
pub const APP_NAME: &str = "Wallpaper Gacha";

/// Extensions accepted by default, lowercase and without the leading dot
pub const DEFAULT_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "jxl", "webp"];

/// Number of leading bytes inspected when sniffing file content
pub const SNIFF_LEN: usize = 512;

/// Default minimum interval between two uploads by the same identity
pub const DEFAULT_COOLDOWN_MINUTES: u64 = 60;

/// Default maximum upload size (50 MiB)
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 50;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "wallpaper-session";

/// Name of the cookie carrying the OAuth `state` nonce between login and callback
pub const OAUTH_STATE_COOKIE: &str = "wallpaper-oauth-state";

/// Default session lifetime (7 days)
pub const DEFAULT_SESSION_MAX_AGE_HOURS: i64 = 24 * 7;

/// Default rotation interval (client)
pub const DEFAULT_INTERVAL_MINUTES: u64 = 30;

/// Default ssh port used by the remote sync
pub const DEFAULT_RSYNC_PORT: u16 = 22;

/// File name of the client history database, created inside the local directory
pub const HISTORY_DB_FILE: &str = "wallpaper-history.db";

/// File name of the client log, created inside the local directory
pub const CLIENT_LOG_FILE: &str = "wallpaper-manager.log";
