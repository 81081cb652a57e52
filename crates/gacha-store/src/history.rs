//! Client display history.
//!
//! Every image file present in the local directory has exactly one row.
//! Rows are added and removed only through [`HistoryStore::reconcile`], and
//! each write runs as a single statement or inside a transaction so that the
//! file survives an abrupt stop of the client.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::database::open_connection;
use crate::error::{Result, StoreError};
use crate::migrations;
use crate::models::{
    format_timestamp, parse_optional_timestamp, parse_timestamp, HistoryEntry, RotationState,
};

/// Outcome of [`HistoryStore::reconcile`]: the true deltas only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl Reconciled {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// History database owned by a single rotation client process.
pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    /// Open (or create) the history database at `path`.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = open_connection(path)?;

        tracing::info!(path = %path.display(), "opening history database");

        migrations::run_history_migrations(&conn)?;

        Ok(Self { conn })
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }

    /// Make the set of rows equal to `present`: files without a row get one
    /// with `shown = false`, rows whose file disappeared are deleted.
    ///
    /// Calling it again with the same set changes nothing.
    pub fn reconcile(&mut self, present: &BTreeSet<String>, now: DateTime<Utc>) -> Result<Reconciled> {
        let tx = self.conn.transaction()?;

        let known: BTreeSet<String> = {
            let mut stmt = tx.prepare("SELECT file_name FROM display_history")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<std::result::Result<_, _>>()?
        };

        let added: BTreeSet<String> = present.difference(&known).cloned().collect();
        let removed: BTreeSet<String> = known.difference(present).cloned().collect();

        {
            let mut insert = tx.prepare(
                "INSERT INTO display_history (file_name, shown, first_seen_at, display_count)
                 VALUES (?1, 0, ?2, 0)",
            )?;
            let seen_at = format_timestamp(now);
            for name in &added {
                insert.execute(params![name, seen_at])?;
            }

            let mut delete = tx.prepare("DELETE FROM display_history WHERE file_name = ?1")?;
            for name in &removed {
                delete.execute(params![name])?;
            }
        }

        tx.commit()?;

        Ok(Reconciled { added, removed })
    }

    /// All rows, ordered by file name.
    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT file_name, shown, first_seen_at, last_shown_at, display_count
             FROM display_history
             ORDER BY file_name ASC",
        )?;
        let rows = stmt.query_map([], row_to_entry)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn get_entry(&self, file_name: &str) -> Result<HistoryEntry> {
        self.conn
            .query_row(
                "SELECT file_name, shown, first_seen_at, last_shown_at, display_count
                 FROM display_history
                 WHERE file_name = ?1",
                params![file_name],
                row_to_entry,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Names of files not yet shown in the current cycle, ordered by name.
    pub fn unshown(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT file_name FROM display_history WHERE shown = 0 ORDER BY file_name ASC",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM display_history", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Clear every `shown` flag and advance the cycle counter.  Returns the
    /// number of rows reset.
    pub fn start_new_cycle(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let reset = tx.execute("UPDATE display_history SET shown = 0 WHERE shown = 1", [])?;
        tx.execute(
            "UPDATE rotation_state SET cycle = cycle + 1, last_reset_at = ?1 WHERE id = 1",
            params![format_timestamp(now)],
        )?;
        tx.commit()?;
        Ok(reset)
    }

    /// Flag a file as shown in the current cycle.  Returns `false` if the
    /// file has no row.
    pub fn mark_shown(&self, file_name: &str, now: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE display_history
             SET shown = 1, last_shown_at = ?1, display_count = display_count + 1
             WHERE file_name = ?2",
            params![format_timestamp(now), file_name],
        )?;
        Ok(affected > 0)
    }

    pub fn rotation_state(&self) -> Result<RotationState> {
        self.conn
            .query_row(
                "SELECT cycle, last_reset_at FROM rotation_state WHERE id = 1",
                [],
                |row| {
                    let cycle: i64 = row.get(0)?;
                    let last_reset: Option<String> = row.get(1)?;
                    Ok(RotationState {
                        cycle: cycle as u64,
                        last_reset_at: parse_optional_timestamp(1, last_reset)?,
                    })
                },
            )
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let file_name: String = row.get(0)?;
    let shown_int: i32 = row.get(1)?;
    let first_seen_str: String = row.get(2)?;
    let last_shown_str: Option<String> = row.get(3)?;
    let display_count: i64 = row.get(4)?;

    Ok(HistoryEntry {
        file_name,
        shown: shown_int != 0,
        first_seen_at: parse_timestamp(2, &first_seen_str)?,
        last_shown_at: parse_optional_timestamp(3, last_shown_str)?,
        display_count: display_count as u64,
    })
}
