use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{format_timestamp, parse_optional_timestamp, parse_timestamp, Identity};

const SELECT_IDENTITY: &str =
    "SELECT external_id, display_name, created_at, last_upload_at FROM identities WHERE external_id = ?1";

impl Database {
    /// Fetch the identity, creating it with `display_name` if it does not
    /// exist yet.  An existing row is returned untouched.
    ///
    /// The insert relies on the primary key (`ON CONFLICT DO NOTHING`), so
    /// concurrent first requests for the same id can never produce two rows.
    pub fn get_or_create_identity(
        &self,
        external_id: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Identity> {
        self.conn().execute(
            "INSERT INTO identities (external_id, display_name, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(external_id) DO NOTHING",
            params![external_id, display_name, format_timestamp(now)],
        )?;
        self.get_identity(external_id)
    }

    /// Create the identity or refresh its display name.  Used on login.
    pub fn upsert_identity(
        &self,
        external_id: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Identity> {
        self.conn().execute(
            "INSERT INTO identities (external_id, display_name, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(external_id) DO UPDATE SET display_name = excluded.display_name",
            params![external_id, display_name, format_timestamp(now)],
        )?;
        self.get_identity(external_id)
    }

    pub fn get_identity(&self, external_id: &str) -> Result<Identity> {
        self.conn()
            .query_row(SELECT_IDENTITY, params![external_id], row_to_identity)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Record `at` as the identity's last upload.  Returns `false` if the
    /// identity does not exist.
    pub fn touch_last_upload(&self, external_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE identities SET last_upload_at = ?1 WHERE external_id = ?2",
            params![format_timestamp(at), external_id],
        )?;
        Ok(affected > 0)
    }

    pub fn count_identities(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn row_to_identity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Identity> {
    let external_id: String = row.get(0)?;
    let display_name: String = row.get(1)?;
    let created_str: String = row.get(2)?;
    let last_upload_str: Option<String> = row.get(3)?;

    Ok(Identity {
        external_id,
        display_name,
        created_at: parse_timestamp(2, &created_str)?,
        last_upload_at: parse_optional_timestamp(3, last_upload_str)?,
    })
}
