//! v001 -- Initial server schema.
//!
//! Creates `identities` and `uploads`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Identities (one row per external account)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS identities (
    external_id    TEXT PRIMARY KEY NOT NULL,  -- provider account id
    display_name   TEXT NOT NULL,
    created_at     TEXT NOT NULL,              -- RFC-3339
    last_upload_at TEXT                        -- RFC-3339, NULL until first upload
);

-- ----------------------------------------------------------------
-- Uploads (one row per accepted file)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS uploads (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id       TEXT NOT NULL,           -- FK -> identities(external_id)
    stored_filename   TEXT NOT NULL UNIQUE,
    original_filename TEXT NOT NULL,
    file_size         INTEGER NOT NULL,
    uploaded_at       TEXT NOT NULL,

    FOREIGN KEY (external_id) REFERENCES identities(external_id)
);

CREATE INDEX IF NOT EXISTS idx_uploads_external_id ON uploads(external_id);
CREATE INDEX IF NOT EXISTS idx_uploads_uploaded_at ON uploads(uploaded_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
