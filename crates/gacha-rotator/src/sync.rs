//! Fetching images from the upload server into the local directory.

use std::path::PathBuf;

use async_trait::async_trait;
use gacha_shared::ImageFormat;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::RotatorConfig;
use crate::error::RotatorError;

#[async_trait]
pub trait RemoteSync: Send + Sync {
    /// Bring the local directory up to date with the remote store.
    async fn sync(&self) -> Result<(), RotatorError>;
}

/// `rsync` over ssh, copying image files only.
#[derive(Debug, Clone)]
pub struct Rsync {
    program: String,
    remote_user: String,
    remote_host: String,
    remote_directory: String,
    port: u16,
    local_directory: PathBuf,
}

impl Rsync {
    pub fn from_config(config: &RotatorConfig) -> Self {
        Self {
            program: "rsync".to_string(),
            remote_user: config.remote_user.clone(),
            remote_host: config.remote_host.clone(),
            remote_directory: config.remote_directory.clone(),
            port: config.rsync_port,
            local_directory: config.local_directory.clone(),
        }
    }

    /// Use another executable in place of `rsync`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// `user@host:dir/`. The trailing slash syncs the directory's contents.
    pub fn remote_path(&self) -> String {
        format!(
            "{}@{}:{}/",
            self.remote_user,
            self.remote_host,
            self.remote_directory.trim_end_matches('/')
        )
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["-avz".to_string()];
        for format in ImageFormat::ALL {
            for ext in format.extensions() {
                args.push(format!("--include=*.{ext}"));
            }
        }
        args.push("--exclude=*".to_string());
        args.push("-e".to_string());
        args.push(format!("ssh -p {}", self.port));
        args.push(self.remote_path());
        args.push(self.local_directory.display().to_string());
        args
    }
}

#[async_trait]
impl RemoteSync for Rsync {
    async fn sync(&self) -> Result<(), RotatorError> {
        tokio::fs::create_dir_all(&self.local_directory).await?;

        info!(remote = %self.remote_path(), "Syncing images");

        let output = Command::new(&self.program)
            .args(self.args())
            .output()
            .await
            .map_err(|e| RotatorError::SyncFailure(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RotatorError::SyncFailure(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        if !output.stdout.is_empty() {
            debug!(output = %String::from_utf8_lossy(&output.stdout), "rsync output");
        }
        info!("Image sync completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RotatorConfig {
        RotatorConfig::from_json(
            r#"{
                "remote_host": "wall.example.org", "remote_user": "wallpaper",
                "remote_directory": "/srv/uploads/", "local_directory": "/tmp/walls",
                "rsync_port": 2222
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_rsync_args() {
        let rsync = Rsync::from_config(&config());
        assert_eq!(
            rsync.args(),
            vec![
                "-avz",
                "--include=*.png",
                "--include=*.jpg",
                "--include=*.jpeg",
                "--include=*.jxl",
                "--include=*.webp",
                "--exclude=*",
                "-e",
                "ssh -p 2222",
                "wallpaper@wall.example.org:/srv/uploads/",
                "/tmp/walls",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_sync_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.local_directory = dir.path().join("walls");

        let rsync = Rsync::from_config(&config).with_program("/nonexistent/rsync");
        let err = rsync.sync().await.unwrap_err();
        assert!(matches!(err, RotatorError::SyncFailure(_)));
        // The local directory is prepared even when the transfer fails.
        assert!(config.local_directory.is_dir());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_sync_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.local_directory = dir.path().to_path_buf();

        let rsync = Rsync::from_config(&config).with_program("false");
        assert!(matches!(rsync.sync().await, Err(RotatorError::SyncFailure(_))));
    }
}
