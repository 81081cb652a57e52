use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use gacha_server::admission::Admission;
use gacha_server::ledger::{lock_db, SqliteLedger};
use gacha_server::oauth::DiscordProvider;
use gacha_server::storage::UploadStore;
use gacha_server::validation::UploadPolicy;
use gacha_server::{api, AppState, ServerConfig};
use gacha_shared::constants::APP_NAME;
use gacha_store::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How often expired sessions are deleted.
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,gacha_server=debug")),
        )
        .init();

    info!("Starting {} upload server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    config.validate().context("invalid configuration")?;
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Server database (identities, uploads, sessions)
    let database = Database::open_at(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    let db = Arc::new(Mutex::new(database));

    // Upload directory (created if missing)
    let store = UploadStore::new(config.upload_directory.clone()).await?;

    let admission = Arc::new(Admission::new(
        UploadPolicy::from_config(&config),
        config.upload_cooldown,
        Arc::new(SqliteLedger::new(db.clone())),
        store,
    ));

    let provider = Arc::new(DiscordProvider::new(&config));

    let http_addr = config.http_addr;
    let app_state = AppState {
        db: db.clone(),
        admission,
        provider,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic session cleanup
    let purge_db = db.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let result = lock_db(&purge_db).purge_expired_sessions(chrono::Utc::now());
            match result {
                Ok(0) => {}
                Ok(purged) => info!(purged, "Purged expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Session purge failed"),
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
