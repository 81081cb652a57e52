//! # gacha-server
//!
//! Upload service for the wallpaper pool.
//!
//! - **Login** through Discord OAuth2, limited to members of allow-listed
//!   servers, with server-side sessions behind an opaque cookie
//! - **Upload admission**: extension allow-list, content sniffing, per-user
//!   cooldown, size limit, then a stream-copy under a generated name
//! - **Bookkeeping** of identities and accepted uploads in SQLite
//!
//! The binary in `main.rs` wires these together; the library is what the
//! integration tests drive.

pub mod admission;
pub mod api;
pub mod config;
pub mod cooldown;
pub mod error;
pub mod ledger;
pub mod oauth;
pub mod session;
pub mod storage;
pub mod validation;

pub use api::{build_router, serve, AppState};
pub use config::ServerConfig;
