use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{format_timestamp, parse_timestamp, NewUpload, UploadRecord};

impl Database {
    pub fn insert_upload(&self, upload: &NewUpload) -> Result<UploadRecord> {
        self.conn().execute(
            "INSERT INTO uploads (external_id, stored_filename, original_filename, file_size, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                upload.external_id,
                upload.stored_filename,
                upload.original_filename,
                upload.file_size as i64,
                format_timestamp(upload.uploaded_at),
            ],
        )?;

        Ok(UploadRecord {
            id: self.conn().last_insert_rowid(),
            external_id: upload.external_id.clone(),
            stored_filename: upload.stored_filename.clone(),
            original_filename: upload.original_filename.clone(),
            file_size: upload.file_size,
            uploaded_at: upload.uploaded_at,
        })
    }

    pub fn get_upload(&self, stored_filename: &str) -> Result<UploadRecord> {
        self.conn()
            .query_row(
                "SELECT id, external_id, stored_filename, original_filename, file_size, uploaded_at
                 FROM uploads
                 WHERE stored_filename = ?1",
                params![stored_filename],
                row_to_upload,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn count_uploads(&self, external_id: &str) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM uploads WHERE external_id = ?1",
            params![external_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Most recent uploads of one identity, newest first.
    pub fn list_uploads(&self, external_id: &str, limit: u32) -> Result<Vec<UploadRecord>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, external_id, stored_filename, original_filename, file_size, uploaded_at
             FROM uploads
             WHERE external_id = ?1
             ORDER BY uploaded_at DESC, id DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![external_id, limit], row_to_upload)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_upload(row: &rusqlite::Row<'_>) -> rusqlite::Result<UploadRecord> {
    let id: i64 = row.get(0)?;
    let external_id: String = row.get(1)?;
    let stored_filename: String = row.get(2)?;
    let original_filename: String = row.get(3)?;
    let file_size: i64 = row.get(4)?;
    let uploaded_str: String = row.get(5)?;

    Ok(UploadRecord {
        id,
        external_id,
        stored_filename,
        original_filename,
        file_size: file_size as u64,
        uploaded_at: parse_timestamp(5, &uploaded_str)?,
    })
}
