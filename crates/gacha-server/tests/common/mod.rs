//! Common test utilities for server integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use gacha_server::admission::Admission;
use gacha_server::ledger::{lock_db, SharedDatabase, SqliteLedger};
use gacha_server::oauth::{IdentityProvider, ProviderError, ProviderIdentity};
use gacha_server::storage::UploadStore;
use gacha_server::validation::UploadPolicy;
use gacha_server::{build_router, AppState, ServerConfig};
use gacha_store::Database;
use tempfile::TempDir;

pub const ALLOWED_SERVER: &str = "900000000000000001";
pub const MB: u64 = 1024 * 1024;

/// Identity provider that answers from fixed data instead of calling Discord.
#[derive(Clone)]
pub struct FakeProvider {
    pub identity: ProviderIdentity,
    pub memberships: HashSet<String>,
    pub fail_exchange: bool,
}

impl FakeProvider {
    pub fn member(id: &str, username: &str) -> Self {
        Self {
            identity: ProviderIdentity {
                id: id.to_string(),
                username: username.to_string(),
            },
            memberships: [ALLOWED_SERVER.to_string(), "42".to_string()].into(),
            fail_exchange: false,
        }
    }

    pub fn outsider(id: &str, username: &str) -> Self {
        Self {
            memberships: ["42".to_string()].into(),
            ..Self::member(id, username)
        }
    }

    pub fn broken() -> Self {
        Self {
            fail_exchange: true,
            ..Self::member("0", "nobody")
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorize_url(&self, state: &str) -> Result<String, ProviderError> {
        Ok(format!("https://auth.test/authorize?state={state}"))
    }

    async fn exchange(&self, code: &str) -> Result<String, ProviderError> {
        if self.fail_exchange {
            return Err(ProviderError::Status {
                status: 500,
                body: "upstream down".to_string(),
            });
        }
        Ok(format!("token-for-{code}"))
    }

    async fn fetch_identity(&self, _token: &str) -> Result<ProviderIdentity, ProviderError> {
        Ok(self.identity.clone())
    }

    async fn fetch_memberships(&self, _token: &str) -> Result<HashSet<String>, ProviderError> {
        Ok(self.memberships.clone())
    }
}

pub const INDEX_HTML: &str = "<h1>Log in with Discord</h1>";
pub const UPLOAD_HTML: &str = "<h1>Upload a wallpaper</h1>";

pub struct TestApp {
    pub server: TestServer,
    /// The same router, for requests that need exact headers.
    pub router: Router,
    pub db: SharedDatabase,
    pub uploads: TempDir,
    _db_dir: TempDir,
    _pages: TempDir,
}

impl TestApp {
    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.uploads.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Create an identity with a live session, returning the session id.
    pub fn login(&self, external_id: &str, display_name: &str) -> String {
        let now = chrono::Utc::now();
        let db = lock_db(&self.db);
        db.upsert_identity(external_id, display_name, now).unwrap();
        db.create_session(external_id, display_name, chrono::Duration::hours(1), now)
            .unwrap()
            .id
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        upload_cooldown: Duration::from_secs(3600),
        max_file_size: MB,
        discord_client_id: "client".into(),
        discord_client_secret: "secret".into(),
        discord_redirect_uri: "http://localhost/auth/callback".into(),
        allowed_server_ids: vec![ALLOWED_SERVER.to_string()],
        cookie_secure: false,
        ..ServerConfig::default()
    }
}

/// Build the real router over temp storage and a fake provider.
pub async fn spawn_app(provider: FakeProvider) -> TestApp {
    let db_dir = tempfile::tempdir().unwrap();
    let uploads = tempfile::tempdir().unwrap();
    let pages = tempfile::tempdir().unwrap();
    std::fs::write(pages.path().join("index.html"), INDEX_HTML).unwrap();
    std::fs::write(pages.path().join("upload.html"), UPLOAD_HTML).unwrap();

    let mut config = test_config();
    config.database_path = db_dir.path().join("wallpaper.db");
    config.upload_directory = uploads.path().to_path_buf();
    config.static_dir = Some(pages.path().to_path_buf());

    let db: SharedDatabase = Arc::new(Mutex::new(Database::open_at(&config.database_path).unwrap()));
    let store = UploadStore::new(config.upload_directory.clone()).await.unwrap();
    let admission = Arc::new(Admission::new(
        UploadPolicy::from_config(&config),
        config.upload_cooldown,
        Arc::new(SqliteLedger::new(db.clone())),
        store,
    ));

    let state = AppState {
        db: db.clone(),
        admission,
        provider: Arc::new(provider),
        config: Arc::new(config),
    };

    let router = build_router(state);
    let server = TestServer::new(router.clone()).expect("Failed to create test server");

    TestApp {
        server,
        router,
        db,
        uploads,
        _db_dir: db_dir,
        _pages: pages,
    }
}

pub fn png_bytes(size: usize) -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec();
    data.resize(size, 0x5A);
    data
}

pub fn wallpaper_form(file_name: &str, data: Vec<u8>) -> MultipartForm {
    MultipartForm::new().add_part(
        "wallpaper",
        Part::bytes(data)
            .file_name(file_name)
            .mime_type("application/octet-stream"),
    )
}

pub fn session_cookie(id: &str) -> cookie::Cookie<'static> {
    cookie::Cookie::new("wallpaper-session", id.to_string())
}

/// A `multipart/form-data` body carrying one wallpaper part, and its content type.
pub fn raw_multipart(file_name: &str, data: &[u8]) -> (String, Vec<u8>) {
    let boundary = "gacha-test-boundary";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"wallpaper\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}
