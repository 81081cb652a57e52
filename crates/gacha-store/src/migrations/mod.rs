//! Database migration runners.
//!
//! Each database carries its own schema version in `PRAGMA user_version`, so
//! every migration runs exactly once per file. The server database and the
//! client history database are versioned independently.

pub mod history_v001;
pub mod v001_initial;
pub mod v002_sessions;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current server schema version.  Bump this and add a new migration module
/// whenever the schema changes.
pub const SERVER_VERSION: u32 = 2;

/// Current history schema version.
pub const HISTORY_VERSION: u32 = 1;

/// Run all pending server migrations against the open connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current = user_version(conn)?;

    tracing::info!(
        current_version = current,
        target_version = SERVER_VERSION,
        "checking server database migrations"
    );

    if current < 1 {
        tracing::info!("applying migration v001_initial");
        v001_initial::up(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", 1)?;
    }

    if current < 2 {
        tracing::info!("applying migration v002_sessions");
        v002_sessions::up(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", 2)?;
    }

    Ok(())
}

/// Run all pending history migrations against the open connection.
pub fn run_history_migrations(conn: &Connection) -> Result<()> {
    let current = user_version(conn)?;

    tracing::debug!(
        current_version = current,
        target_version = HISTORY_VERSION,
        "checking history database migrations"
    );

    if current < 1 {
        tracing::info!("applying migration history_v001");
        history_v001::up(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", 1)?;
    }

    Ok(())
}

fn user_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
