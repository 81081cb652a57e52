//! Bookkeeping seam between admission and the server database.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gacha_store::{Database, Identity, NewUpload, StoreError, UploadRecord};

/// The database shared by every request handler.
pub type SharedDatabase = Arc<Mutex<Database>>;

/// Lock the shared database. A panic while holding the lock leaves SQLite
/// consistent, so a poisoned lock is simply taken over.
pub fn lock_db(db: &Mutex<Database>) -> MutexGuard<'_, Database> {
    db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Identity and upload records needed by admission.
#[async_trait]
pub trait UploadLedger: Send + Sync {
    /// Atomic get-or-create of the identity row.
    async fn get_or_create_identity(
        &self,
        external_id: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Identity, StoreError>;

    async fn record_upload(&self, upload: &NewUpload) -> Result<UploadRecord, StoreError>;

    async fn touch_last_upload(&self, external_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn upload_count(&self, external_id: &str) -> Result<u64, StoreError>;
}

/// [`UploadLedger`] over the SQLite server database.
#[derive(Clone)]
pub struct SqliteLedger {
    db: SharedDatabase,
}

impl SqliteLedger {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UploadLedger for SqliteLedger {
    async fn get_or_create_identity(
        &self,
        external_id: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Identity, StoreError> {
        lock_db(&self.db).get_or_create_identity(external_id, display_name, now)
    }

    async fn record_upload(&self, upload: &NewUpload) -> Result<UploadRecord, StoreError> {
        lock_db(&self.db).insert_upload(upload)
    }

    async fn touch_last_upload(&self, external_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        if lock_db(&self.db).touch_last_upload(external_id, at)? {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn upload_count(&self, external_id: &str) -> Result<u64, StoreError> {
        lock_db(&self.db).count_uploads(external_id)
    }
}
