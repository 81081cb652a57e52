//! # gacha-store
//!
//! SQLite persistence for both halves of the system.
//!
//! - [`Database`] is the server database: identities, accepted uploads and
//!   login sessions.
//! - [`HistoryStore`] is the rotation client's history database: which local
//!   images have been shown in the current cycle.
//!
//! Both wrap a synchronous `rusqlite::Connection` and run their schema
//! migrations on open.

pub mod database;
pub mod history;
pub mod identities;
pub mod migrations;
pub mod models;
pub mod sessions;
pub mod uploads;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use history::{HistoryStore, Reconciled};
pub use models::*;
