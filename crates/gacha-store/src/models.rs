//! Domain model structs persisted in the SQLite databases.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// An end-user known to the server.  The primary key is the identity
/// provider's stable account id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Provider account id.
    pub external_id: String,
    /// Display name, refreshed on every successful login.
    pub display_name: String,
    /// When the identity was first seen.
    pub created_at: DateTime<Utc>,
    /// Time of the last accepted upload, if any.
    pub last_upload_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// Fields of an upload about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUpload {
    pub external_id: String,
    pub stored_filename: String,
    pub original_filename: String,
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// One accepted file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadRecord {
    /// Sequential surrogate id.
    pub id: i64,
    /// Owning identity.
    pub external_id: String,
    /// System-generated name of the file on disk.
    pub stored_filename: String,
    /// Name the uploader supplied.  Untrusted, never used as a path.
    pub original_filename: String,
    /// Bytes actually written to storage.
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An authenticated login session.  Rows are only created after the identity
/// provider confirmed the user, so a live row means "authenticated".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Opaque id carried in the session cookie.
    pub id: String,
    pub external_id: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Display history (client)
// ---------------------------------------------------------------------------

/// Display status of one local image file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// File name inside the local directory.
    pub file_name: String,
    /// Whether the file was shown in the current cycle.
    pub shown: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_shown_at: Option<DateTime<Utc>>,
    /// Times shown across all cycles.
    pub display_count: u64,
}

/// Cycle bookkeeping for the rotation client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RotationState {
    /// 1-based number of the current cycle.
    pub cycle: u64,
    pub last_reset_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

/// Fixed-width RFC-3339 (`2024-05-01T12:00:00.000000Z`) so that stored
/// timestamps also compare correctly as text inside SQL.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_optional_timestamp(
    idx: usize,
    value: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(idx, &v)).transpose()
}
