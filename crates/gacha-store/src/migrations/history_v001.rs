//! history v001 -- Client display history.
//!
//! `display_history` holds one row per image file present in the local
//! directory. `rotation_state` is a singleton row holding the current cycle number.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS display_history (
    file_name     TEXT PRIMARY KEY NOT NULL,   -- name inside the local directory
    shown         INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1, current cycle
    first_seen_at TEXT NOT NULL,
    last_shown_at TEXT,
    display_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_display_history_shown ON display_history(shown);

CREATE TABLE IF NOT EXISTS rotation_state (
    id            INTEGER PRIMARY KEY CHECK (id = 1),
    cycle         INTEGER NOT NULL DEFAULT 1,
    last_reset_at TEXT
);

INSERT OR IGNORE INTO rotation_state (id) VALUES (1);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
