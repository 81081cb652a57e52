//! The rotation loop: sync, reconcile, select, display.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::Rng;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::{MonitorTargets, RotatorConfig};
use crate::display::WallpaperSetter;
use crate::error::RotatorError;
use crate::inventory;
use crate::sync::RemoteSync;
use crate::tracker::RotationTracker;

pub struct Rotator<R: Rng = StdRng> {
    tracker: RotationTracker<R>,
    remote: Arc<dyn RemoteSync>,
    setter: Arc<dyn WallpaperSetter>,
    local_directory: PathBuf,
    monitors: MonitorTargets,
    interval: Duration,
}

impl<R: Rng> Rotator<R> {
    pub fn new(
        tracker: RotationTracker<R>,
        remote: Arc<dyn RemoteSync>,
        setter: Arc<dyn WallpaperSetter>,
        config: &RotatorConfig,
    ) -> Self {
        Self {
            tracker,
            remote,
            setter,
            local_directory: config.local_directory.clone(),
            monitors: config.monitors.clone(),
            interval: config.interval(),
        }
    }

    pub fn tracker(&self) -> &RotationTracker<R> {
        &self.tracker
    }

    /// One full cycle. Returns the file that was displayed.
    ///
    /// A failed sync ends the cycle before anything is selected. A failed
    /// display keeps the image marked as shown.
    pub async fn run_cycle(&mut self) -> Result<String, RotatorError> {
        info!("Running wallpaper rotation cycle");

        self.remote.sync().await?;

        let present = inventory::scan(&self.local_directory)?;
        let now = Utc::now();
        self.tracker.sync_local_inventory(&present, now)?;

        let chosen = self.tracker.select_next(now)?;
        info!(file = %chosen, "Selected wallpaper");

        self.setter
            .apply(&self.local_directory.join(&chosen), &self.monitors)
            .await?;
        Ok(chosen)
    }

    /// Run one cycle and log its failure instead of returning it.
    pub async fn run_once(&mut self) -> Option<String> {
        match self.run_cycle().await {
            Ok(chosen) => Some(chosen),
            Err(RotatorError::NoImagesAvailable) => {
                warn!("No images available, skipping cycle");
                None
            }
            Err(e) => {
                error!(error = %e, "Rotation cycle failed");
                None
            }
        }
    }

    /// Cycle now and then every interval until `shutdown` turns true.
    ///
    /// The signal is only looked at between cycles.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting wallpaper rotation daemon"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    // A dropped sender also means stop.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Wallpaper rotation daemon stopped");
    }
}
