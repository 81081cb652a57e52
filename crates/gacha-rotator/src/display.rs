//! Setting the desktop background.

use std::path::Path;
use std::process::Output;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::config::MonitorTargets;
use crate::error::RotatorError;

#[async_trait]
pub trait WallpaperSetter: Send + Sync {
    async fn apply(&self, image: &Path, targets: &MonitorTargets) -> Result<(), RotatorError>;
}

/// Hyprland's hyprpaper, driven through `hyprctl`.
#[derive(Debug, Clone)]
pub struct Hyprpaper {
    program: String,
}

#[derive(Deserialize)]
struct Monitor {
    name: String,
}

impl Default for Hyprpaper {
    fn default() -> Self {
        Self {
            program: "hyprctl".to_string(),
        }
    }
}

impl Hyprpaper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn hyprctl(&self, args: &[&str]) -> Result<Output, RotatorError> {
        Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| RotatorError::DisplayFailure(format!("failed to run {}: {e}", self.program)))
    }

    /// Names of the connected monitors.
    pub async fn monitors(&self) -> Result<Vec<String>, RotatorError> {
        let output = self.hyprctl(&["monitors", "-j"]).await?;
        if !output.status.success() {
            return Err(RotatorError::DisplayFailure(format!(
                "listing monitors failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_monitors(&output.stdout)
    }
}

/// Parse the JSON array printed by `hyprctl monitors -j`.
pub fn parse_monitors(json: &[u8]) -> Result<Vec<String>, RotatorError> {
    let monitors: Vec<Monitor> = serde_json::from_slice(json)
        .map_err(|e| RotatorError::DisplayFailure(format!("unreadable monitor list: {e}")))?;
    Ok(monitors.into_iter().map(|m| m.name).collect())
}

#[async_trait]
impl WallpaperSetter for Hyprpaper {
    async fn apply(&self, image: &Path, targets: &MonitorTargets) -> Result<(), RotatorError> {
        let image_arg = image.display().to_string();

        let preload = self.hyprctl(&["hyprpaper", "preload", &image_arg]).await?;
        if !preload.status.success() {
            return Err(RotatorError::DisplayFailure(format!(
                "preload failed: {}",
                String::from_utf8_lossy(&preload.stderr).trim()
            )));
        }

        let monitors = match targets {
            MonitorTargets::All => self.monitors().await?,
            MonitorTargets::Named(names) => names.clone(),
        };
        if monitors.is_empty() {
            return Err(RotatorError::DisplayFailure("no monitors found".to_string()));
        }

        let mut applied = 0usize;
        for monitor in &monitors {
            let target = format!("{monitor},{image_arg}");
            match self.hyprctl(&["hyprpaper", "wallpaper", &target]).await {
                Ok(output) if output.status.success() => {
                    debug!(monitor = %monitor, "Set wallpaper on monitor");
                    applied += 1;
                }
                Ok(output) => error!(
                    monitor = %monitor,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Failed to set wallpaper on monitor"
                ),
                Err(e) => error!(monitor = %monitor, error = %e, "Failed to set wallpaper on monitor"),
            }
        }

        if applied == 0 {
            return Err(RotatorError::DisplayFailure(
                "no monitor accepted the wallpaper".to_string(),
            ));
        }

        info!(image = %image_arg, monitors = applied, "Wallpaper set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_monitors() {
        let json = br#"[{"id":0,"name":"DP-1","width":2560},{"id":1,"name":"HDMI-A-1"}]"#;
        assert_eq!(parse_monitors(json).unwrap(), vec!["DP-1", "HDMI-A-1"]);
        assert!(matches!(
            parse_monitors(b"not json"),
            Err(RotatorError::DisplayFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_hyprctl_is_display_failure() {
        let setter = Hyprpaper::with_program("/nonexistent/hyprctl");
        let err = setter
            .apply(Path::new("/tmp/a.png"), &MonitorTargets::All)
            .await
            .unwrap_err();
        assert!(matches!(err, RotatorError::DisplayFailure(_)));
    }

    #[tokio::test]
    async fn test_failing_hyprctl_is_display_failure() {
        let setter = Hyprpaper::with_program("false");
        let err = setter
            .apply(
                Path::new("/tmp/a.png"),
                &MonitorTargets::Named(vec!["DP-1".into()]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RotatorError::DisplayFailure(_)));
    }

    #[tokio::test]
    async fn test_every_monitor_accepting() {
        // `true` succeeds for preload and for each monitor.
        let setter = Hyprpaper::with_program("true");
        setter
            .apply(
                Path::new("/tmp/a.png"),
                &MonitorTargets::Named(vec!["DP-1".into(), "DP-2".into()]),
            )
            .await
            .unwrap();
    }
}
