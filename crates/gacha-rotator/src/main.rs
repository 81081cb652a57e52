use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gacha_rotator::config::DEFAULT_CONFIG_FILE;
use gacha_rotator::display::Hyprpaper;
use gacha_rotator::sync::Rsync;
use gacha_rotator::{RotationTracker, Rotator, RotatorConfig};
use gacha_store::HistoryStore;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Wallpaper Gacha rotation client")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // -----------------------------------------------------------------------
    // 1. Load configuration
    // -----------------------------------------------------------------------
    let config = RotatorConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    // -----------------------------------------------------------------------
    // 2. Initialize tracing: stdout plus a log file in the local directory
    // -----------------------------------------------------------------------
    std::fs::create_dir_all(&config.local_directory)
        .with_context(|| format!("creating {}", config.local_directory.display()))?;

    let file_appender =
        tracing_appender::rolling::never(&config.local_directory, config.log_file_name());
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.directive())),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open history and assemble the rotator
    // -----------------------------------------------------------------------
    let history = HistoryStore::open_at(&config.history_db_path())?;
    let mut rotator = Rotator::new(
        RotationTracker::new(history),
        Arc::new(Rsync::from_config(&config)),
        Arc::new(Hyprpaper::new()),
        &config,
    );

    if args.once {
        rotator.run_once().await;
        return Ok(());
    }

    // -----------------------------------------------------------------------
    // 4. Run until Ctrl+C (honored between cycles)
    // -----------------------------------------------------------------------
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping after the current cycle");
            let _ = stop_tx.send(true);
        }
    });

    rotator.run(stop_rx).await;

    Ok(())
}
