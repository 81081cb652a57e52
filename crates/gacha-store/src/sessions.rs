use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::models::{format_timestamp, parse_timestamp, Session};

/// Random bytes in a session id (hex-encoded to twice as many chars).
const SESSION_ID_BYTES: usize = 32;

impl Database {
    /// Start a session for an identity that already exists.
    pub fn create_session(
        &self,
        external_id: &str,
        display_name: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let mut raw = [0u8; SESSION_ID_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut raw);

        let session = Session {
            id: hex::encode(raw),
            external_id: external_id.to_string(),
            display_name: display_name.to_string(),
            created_at: now,
            expires_at: now + ttl,
        };

        self.conn().execute(
            "INSERT INTO sessions (id, external_id, display_name, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                session.external_id,
                session.display_name,
                format_timestamp(session.created_at),
                format_timestamp(session.expires_at),
            ],
        )?;

        Ok(session)
    }

    /// Look up a live session.  Unknown and expired ids both yield `None`.
    pub fn get_session(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Session>> {
        let session = self
            .conn()
            .query_row(
                "SELECT id, external_id, display_name, created_at, expires_at
                 FROM sessions
                 WHERE id = ?1 AND expires_at > ?2",
                params![id, format_timestamp(now)],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    pub fn delete_session(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// Remove every session that expired at or before `now`.
    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![format_timestamp(now)],
        )?;
        Ok(affected)
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let id: String = row.get(0)?;
    let external_id: String = row.get(1)?;
    let display_name: String = row.get(2)?;
    let created_str: String = row.get(3)?;
    let expires_str: String = row.get(4)?;

    Ok(Session {
        id,
        external_id,
        display_name,
        created_at: parse_timestamp(3, &created_str)?,
        expires_at: parse_timestamp(4, &expires_str)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn open_with_identity() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("wallpaper.db")).unwrap();
        db.upsert_identity("1001", "alice", Utc::now()).unwrap();
        (db, dir)
    }

    #[test]
    fn session_lifecycle() {
        let (db, _dir) = open_with_identity();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let session = db.create_session("1001", "alice", Duration::hours(1), t0).unwrap();
        assert_eq!(session.id.len(), SESSION_ID_BYTES * 2);

        let found = db.get_session(&session.id, t0 + Duration::minutes(59)).unwrap();
        assert_eq!(found, Some(session.clone()));

        assert!(db.delete_session(&session.id).unwrap());
        assert_eq!(db.get_session(&session.id, t0).unwrap(), None);
    }

    #[test]
    fn expired_session_is_invisible_and_purged() {
        let (db, _dir) = open_with_identity();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let session = db.create_session("1001", "alice", Duration::hours(1), t0).unwrap();
        let later = t0 + Duration::hours(1);

        assert_eq!(db.get_session(&session.id, later).unwrap(), None);
        assert_eq!(db.purge_expired_sessions(later).unwrap(), 1);
        assert_eq!(db.purge_expired_sessions(later).unwrap(), 0);
    }

    #[test]
    fn unknown_or_garbage_id_is_none() {
        let (db, _dir) = open_with_identity();
        assert_eq!(db.get_session("not-a-session", Utc::now()).unwrap(), None);
        assert_eq!(db.get_session("", Utc::now()).unwrap(), None);
    }

    #[test]
    fn session_ids_are_distinct() {
        let (db, _dir) = open_with_identity();
        let now = Utc::now();
        let a = db.create_session("1001", "alice", Duration::hours(1), now).unwrap();
        let b = db.create_session("1001", "alice", Duration::hours(1), now).unwrap();
        assert_ne!(a.id, b.id);
    }
}
