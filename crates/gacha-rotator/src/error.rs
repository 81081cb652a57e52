use gacha_store::StoreError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum RotatorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("no images available")]
    NoImagesAvailable,

    #[error("sync failed: {0}")]
    SyncFailure(String),

    #[error("could not set wallpaper: {0}")]
    DisplayFailure(String),

    #[error("history database error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
