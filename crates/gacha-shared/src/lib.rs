//! # gacha-shared
//!
//! Definitions shared by the upload server and the rotation client: the
//! image formats the system accepts, signature sniffing, and the constants
//! both sides agree on.

pub mod constants;
pub mod formats;

pub use formats::{sniff, ImageFormat};
