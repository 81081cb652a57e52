//! # gacha-rotator
//!
//! Desktop side of the wallpaper pool. Every interval it pulls new uploads
//! from the server with rsync, brings the local history database in line
//! with the files on disk, picks an image that has not been shown in the
//! current cycle and hands it to hyprpaper.

pub mod config;
pub mod daemon;
pub mod display;
pub mod error;
pub mod inventory;
pub mod sync;
pub mod tracker;

pub use config::{MonitorTargets, RotatorConfig};
pub use daemon::Rotator;
pub use error::RotatorError;
pub use tracker::RotationTracker;
