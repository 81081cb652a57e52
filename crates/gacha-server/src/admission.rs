//! Upload admission: the validate-then-persist decision for one upload.
//!
//! Order of checks for an authenticated uploader:
//!
//! 1. declared size against the configured maximum
//! 2. get-or-create of the identity row (atomic in the store)
//! 3. cooldown since the identity's last accepted upload
//! 4. extension allow-list
//! 5. content signature of the leading bytes
//!
//! Only then is a file created under a generated name. A failure while
//! copying or while recording the upload removes that file again, so a
//! rejected or failed upload never leaves anything on disk.
//!
//! Updating `last_upload_at` happens after the record is written and is
//! best-effort: if it fails the upload still counts, and the uploader may
//! slip in one extra upload before the cooldown applies.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use gacha_shared::constants::SNIFF_LEN;
use gacha_store::{Identity, NewUpload, Session, UploadRecord};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::cooldown::{can_upload, CooldownStatus};
use crate::error::AdmissionError;
use crate::ledger::UploadLedger;
use crate::storage::UploadStore;
use crate::validation::UploadPolicy;

/// The authenticated identity behind an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploader {
    pub external_id: String,
    pub display_name: String,
}

impl From<&Session> for Uploader {
    fn from(session: &Session) -> Self {
        Self {
            external_id: session.external_id.clone(),
            display_name: session.display_name.clone(),
        }
    }
}

/// A file as it arrives: the declared name and its body as a byte stream.
pub struct IncomingFile<S> {
    pub file_name: String,
    pub body: S,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub record: UploadRecord,
    /// Lifetime uploads of the identity, `None` if the count could not be read.
    pub total_uploads: Option<u64>,
}

pub struct Admission {
    policy: UploadPolicy,
    cooldown: Duration,
    ledger: Arc<dyn UploadLedger>,
    store: UploadStore,
}

impl Admission {
    pub fn new(
        policy: UploadPolicy,
        cooldown: Duration,
        ledger: Arc<dyn UploadLedger>,
        store: UploadStore,
    ) -> Self {
        Self {
            policy,
            cooldown,
            ledger,
            store,
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn store(&self) -> &UploadStore {
        &self.store
    }

    pub fn cooldown_for(&self, identity: &Identity, now: DateTime<Utc>) -> CooldownStatus {
        can_upload(identity.last_upload_at, self.cooldown, now)
    }

    /// Checks that need nothing but the request headers.
    pub fn precheck(&self, uploader: &Uploader, declared_size: Option<u64>) -> Result<(), AdmissionError> {
        if uploader.external_id.is_empty() {
            return Err(AdmissionError::Unauthenticated);
        }
        self.policy.check_declared_size(declared_size)
    }

    /// Run the full admission for one file.
    pub async fn admit<S>(
        &self,
        uploader: &Uploader,
        declared_size: Option<u64>,
        file: IncomingFile<S>,
        now: DateTime<Utc>,
    ) -> Result<Admitted, AdmissionError>
    where
        S: Stream<Item = Result<Bytes, AdmissionError>>,
    {
        let original_filename = file.file_name.clone();
        let result = self.try_admit(uploader, declared_size, file, now).await;

        match &result {
            Ok(admitted) => info!(
                external_id = %uploader.external_id,
                stored = %admitted.record.stored_filename,
                original = %original_filename,
                size = admitted.record.file_size,
                "Upload accepted"
            ),
            Err(e @ AdmissionError::StorageFailure(_)) => error!(
                external_id = %uploader.external_id,
                original = %original_filename,
                error = %e,
                "Upload failed"
            ),
            Err(e) => warn!(
                external_id = %uploader.external_id,
                original = %original_filename,
                reason = %e,
                "Upload rejected"
            ),
        }

        result
    }

    async fn try_admit<S>(
        &self,
        uploader: &Uploader,
        declared_size: Option<u64>,
        file: IncomingFile<S>,
        now: DateTime<Utc>,
    ) -> Result<Admitted, AdmissionError>
    where
        S: Stream<Item = Result<Bytes, AdmissionError>>,
    {
        self.precheck(uploader, declared_size)?;

        let identity = self
            .ledger
            .get_or_create_identity(&uploader.external_id, &uploader.display_name, now)
            .await?;

        let status = self.cooldown_for(&identity, now);
        if !status.allowed {
            return Err(AdmissionError::RateLimited {
                remaining: status.remaining,
            });
        }

        let (ext, format) = self.policy.check_extension(&file.file_name)?;

        let mut body = pin!(file.body);
        let head = read_head(&mut body, SNIFF_LEN).await?;
        self.policy
            .check_content(format, &head[..head.len().min(SNIFF_LEN)])?;

        let stored_filename = UploadStore::generate_name(&ext);
        self.store.ensure_dir().await?;
        let (path, dest) = self.store.create_new(&stored_filename).await?;

        let file_size = match write_body(dest, head, &mut body, self.policy.max_file_size()).await {
            Ok(written) => written,
            Err(e) => {
                self.store.discard(&path).await;
                return Err(e);
            }
        };

        let upload = NewUpload {
            external_id: identity.external_id.clone(),
            stored_filename,
            original_filename: file.file_name,
            file_size,
            uploaded_at: now,
        };

        let record = match self.ledger.record_upload(&upload).await {
            Ok(record) => record,
            Err(e) => {
                self.store.discard(&path).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.ledger.touch_last_upload(&identity.external_id, now).await {
            warn!(
                external_id = %identity.external_id,
                error = %e,
                "Upload stored but last upload time was not updated"
            );
        }

        let total_uploads = match self.ledger.upload_count(&identity.external_id).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(external_id = %identity.external_id, error = %e, "Failed to count uploads");
                None
            }
        };

        Ok(Admitted {
            record,
            total_uploads,
        })
    }
}

/// Pull chunks until at least `len` bytes are buffered or the body ends.
async fn read_head<S>(body: &mut S, len: usize) -> Result<Vec<u8>, AdmissionError>
where
    S: Stream<Item = Result<Bytes, AdmissionError>> + Unpin,
{
    let mut head = Vec::with_capacity(len);
    while head.len() < len {
        match body.next().await {
            Some(chunk) => head.extend_from_slice(&chunk?),
            None => break,
        }
    }
    Ok(head)
}

/// Write the buffered head and the rest of the body. Returns bytes written.
async fn write_body<S>(
    mut dest: File,
    head: Vec<u8>,
    rest: &mut S,
    max: u64,
) -> Result<u64, AdmissionError>
where
    S: Stream<Item = Result<Bytes, AdmissionError>> + Unpin,
{
    let mut written = 0u64;
    let mut chunk = Bytes::from(head);
    loop {
        written += chunk.len() as u64;
        if written > max {
            return Err(AdmissionError::PayloadTooLarge { max });
        }
        dest.write_all(&chunk).await.map_err(write_failure)?;

        match rest.next().await {
            Some(next) => chunk = next?,
            None => break,
        }
    }

    dest.flush().await.map_err(write_failure)?;
    dest.sync_all().await.map_err(write_failure)?;
    Ok(written)
}

fn write_failure(e: std::io::Error) -> AdmissionError {
    AdmissionError::StorageFailure(format!("Failed to write upload: {e}"))
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use gacha_store::{Database, StoreError};

    use super::*;
    use crate::ledger::{lock_db, SharedDatabase, SqliteLedger};

    const PNG_HEAD: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const MB: u64 = 1024 * 1024;

    struct Harness {
        db: SharedDatabase,
        uploads: tempfile::TempDir,
        _db_dir: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let db_dir = tempfile::tempdir().unwrap();
            let db = Database::open_at(&db_dir.path().join("wallpaper.db")).unwrap();
            Self {
                db: Arc::new(Mutex::new(db)),
                uploads: tempfile::tempdir().unwrap(),
                _db_dir: db_dir,
            }
        }

        async fn admission_with(&self, ledger: Arc<dyn UploadLedger>) -> Admission {
            let store = UploadStore::new(self.uploads.path().to_path_buf()).await.unwrap();
            Admission::new(
                UploadPolicy::new(["png", "jpg", "jpeg", "jxl", "webp"], 50 * MB),
                Duration::from_secs(3600),
                ledger,
                store,
            )
        }

        async fn admission(&self) -> Admission {
            self.admission_with(Arc::new(SqliteLedger::new(self.db.clone())))
                .await
        }

        fn stored_files(&self) -> usize {
            count_files(self.uploads.path())
        }
    }

    fn count_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    fn uploader(id: &str) -> Uploader {
        Uploader {
            external_id: id.to_string(),
            display_name: format!("user-{id}"),
        }
    }

    fn png_of_size(size: usize) -> Vec<u8> {
        let mut data = PNG_HEAD.to_vec();
        data.resize(size, 0xAB);
        data
    }

    fn incoming(
        name: &str,
        data: Vec<u8>,
    ) -> IncomingFile<impl Stream<Item = Result<Bytes, AdmissionError>>> {
        let chunks: Vec<Result<Bytes, AdmissionError>> = data
            .chunks(64 * 1024)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        IncomingFile {
            file_name: name.to_string(),
            body: futures::stream::iter(chunks),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_cooldown_scenario() {
        let h = Harness::new();
        let admission = h.admission().await;
        let user = uploader("U1");
        let data = png_of_size(2 * MB as usize);

        let first = admission
            .admit(&user, Some(2 * MB), incoming("a.png", data.clone()), t0())
            .await
            .unwrap();
        assert_eq!(first.total_uploads, Some(1));
        assert_eq!(first.record.file_size, 2 * MB);
        assert_eq!(first.record.original_filename, "a.png");
        assert_ne!(first.record.stored_filename, "a.png");

        let stored = h.uploads.path().join(&first.record.stored_filename);
        assert_eq!(std::fs::read(&stored).unwrap(), data);

        let err = admission
            .admit(
                &user,
                Some(2 * MB),
                incoming("b.png", data.clone()),
                t0() + chrono::Duration::minutes(30),
            )
            .await
            .unwrap_err();
        match err {
            AdmissionError::RateLimited { remaining } => {
                assert_eq!(remaining, Duration::from_secs(1800))
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
        assert_eq!(h.stored_files(), 1);

        let third = admission
            .admit(
                &user,
                Some(2 * MB),
                incoming("c.png", data),
                t0() + chrono::Duration::minutes(61),
            )
            .await
            .unwrap();
        assert_eq!(third.total_uploads, Some(2));
        assert_eq!(h.stored_files(), 2);

        let identity = lock_db(&h.db).get_identity("U1").unwrap();
        assert_eq!(identity.last_upload_at, Some(t0() + chrono::Duration::minutes(61)));
    }

    #[tokio::test]
    async fn test_executable_rejected_without_write() {
        let h = Harness::new();
        let admission = h.admission().await;

        let err = admission
            .admit(&uploader("U1"), Some(16), incoming("wallpaper.exe", png_of_size(16)), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::InvalidType(_)));
        assert_eq!(h.stored_files(), 0);
    }

    #[tokio::test]
    async fn test_disguised_content_rejected() {
        let h = Harness::new();
        let admission = h.admission().await;

        let err = admission
            .admit(&uploader("U1"), None, incoming("cat.png", b"MZ\x90\0not an image".to_vec()), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::InvalidType(_)));
        assert_eq!(h.stored_files(), 0);

        // Rejection does not start the cooldown.
        let identity = lock_db(&h.db).get_identity("U1").unwrap();
        assert_eq!(identity.last_upload_at, None);
    }

    #[tokio::test]
    async fn test_jxl_is_accepted_without_signature() {
        let h = Harness::new();
        let admission = h.admission().await;

        let admitted = admission
            .admit(&uploader("U1"), None, incoming("photo.JXL", b"\xFF\x0Ajxl-body".to_vec()), t0())
            .await
            .unwrap();
        assert!(admitted.record.stored_filename.ends_with(".jxl"));
    }

    #[tokio::test]
    async fn test_declared_size_rejected_before_reading() {
        let h = Harness::new();
        let admission = h.admission().await;

        let err = admission
            .admit(&uploader("U1"), Some(51 * MB), incoming("a.png", png_of_size(32)), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::PayloadTooLarge { .. }));
        assert_eq!(h.stored_files(), 0);
    }

    #[tokio::test]
    async fn test_oversized_stream_is_removed() {
        let h = Harness::new();
        let store = UploadStore::new(h.uploads.path().to_path_buf()).await.unwrap();
        let admission = Admission::new(
            UploadPolicy::new(["png"], 100 * 1024),
            Duration::from_secs(3600),
            Arc::new(SqliteLedger::new(h.db.clone())),
            store,
        );

        // Declared size lies; the copy enforces the real limit.
        let err = admission
            .admit(&uploader("U1"), Some(10), incoming("a.png", png_of_size(300 * 1024)), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::PayloadTooLarge { .. }));
        assert_eq!(h.stored_files(), 0);
        assert_eq!(lock_db(&h.db).count_uploads("U1").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stream_error_removes_partial_file() {
        let h = Harness::new();
        let admission = h.admission().await;

        let chunks = vec![
            Ok(Bytes::from(png_of_size(1024))),
            Err(AdmissionError::MalformedUpload("connection reset".into())),
        ];
        let file = IncomingFile {
            file_name: "a.png".to_string(),
            body: futures::stream::iter(chunks),
        };

        let err = admission.admit(&uploader("U1"), None, file, t0()).await.unwrap_err();
        assert!(matches!(err, AdmissionError::MalformedUpload(_)));
        assert_eq!(h.stored_files(), 0);
    }

    #[tokio::test]
    async fn test_empty_identity_is_unauthenticated() {
        let h = Harness::new();
        let admission = h.admission().await;

        let err = admission
            .admit(&uploader(""), None, incoming("a.png", png_of_size(32)), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::Unauthenticated));
        assert_eq!(lock_db(&h.db).count_identities().unwrap(), 0);
    }

    struct FailingRecordLedger(SqliteLedger);

    #[async_trait]
    impl UploadLedger for FailingRecordLedger {
        async fn get_or_create_identity(
            &self,
            external_id: &str,
            display_name: &str,
            now: DateTime<Utc>,
        ) -> Result<Identity, StoreError> {
            self.0.get_or_create_identity(external_id, display_name, now).await
        }

        async fn record_upload(&self, _upload: &NewUpload) -> Result<UploadRecord, StoreError> {
            Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "forced failure",
            )))
        }

        async fn touch_last_upload(&self, external_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
            self.0.touch_last_upload(external_id, at).await
        }

        async fn upload_count(&self, external_id: &str) -> Result<u64, StoreError> {
            self.0.upload_count(external_id).await
        }
    }

    #[tokio::test]
    async fn test_record_failure_rolls_back_file() {
        let h = Harness::new();
        let ledger = Arc::new(FailingRecordLedger(SqliteLedger::new(h.db.clone())));
        let admission = h.admission_with(ledger).await;

        let err = admission
            .admit(&uploader("U1"), None, incoming("a.png", png_of_size(4096)), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::StorageFailure(_)));
        assert_eq!(h.stored_files(), 0);

        let identity = lock_db(&h.db).get_identity("U1").unwrap();
        assert_eq!(identity.last_upload_at, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_first_uploads_create_one_identity() {
        let h = Harness::new();
        let admission = Arc::new(h.admission().await);

        let tasks: Vec<_> = ["a.png", "b.png"]
            .into_iter()
            .map(|name| {
                let admission = admission.clone();
                tokio::spawn(async move {
                    admission
                        .admit(&uploader("fresh"), None, incoming(name, png_of_size(2048)), t0())
                        .await
                })
            })
            .collect();

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert!(admitted >= 1);

        let db = lock_db(&h.db);
        assert_eq!(db.count_identities().unwrap(), 1);
        let uploads = db.count_uploads("fresh").unwrap() as usize;
        assert_eq!(uploads, h.stored_files());
    }

    #[tokio::test]
    async fn test_missing_directory_is_recreated() {
        let h = Harness::new();
        let admission = h.admission().await;
        std::fs::remove_dir_all(h.uploads.path()).unwrap();

        admission
            .admit(&uploader("U1"), None, incoming("a.webp", b"RIFF\x24\0\0\0WEBPVP8 data".to_vec()), t0())
            .await
            .unwrap();
        assert_eq!(h.stored_files(), 1);
    }
}
