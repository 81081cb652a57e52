use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, Query, Request, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use gacha_shared::constants::SESSION_COOKIE;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tower_cookies::{CookieManagerLayer, Cookies};
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::admission::{Admission, IncomingFile, Uploader};
use crate::config::ServerConfig;
use crate::error::{AdmissionError, ServerError, UploadResponse};
use crate::ledger::{lock_db, SharedDatabase};
use crate::oauth::{is_member_of_allowed, IdentityProvider};
use crate::session::{
    clear_session_cookie, current_session, issue_state_cookie, set_session_cookie,
    take_state_cookie,
};

/// Multipart field carrying the uploaded file.
pub const UPLOAD_FIELD: &str = "wallpaper";

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Page reserved for logged-in users.
const UPLOAD_PAGE: &str = "/upload";

/// Uploads listed by `/api/me`.
const RECENT_UPLOADS: u32 = 10;

#[derive(Clone)]
pub struct AppState {
    pub db: SharedDatabase,
    pub admission: Arc<Admission>,
    pub provider: Arc<dyn IdentityProvider>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let router = Router::new()
        .route("/", get(home))
        .route(UPLOAD_PAGE, get(upload_page))
        .route("/health", get(health_check))
        .route("/auth/login", get(login))
        .route("/auth/callback", get(callback))
        .route("/auth/logout", get(logout))
        .route("/api/me", get(me))
        .route(
            "/api/upload",
            post(upload).layer(DefaultBodyLimit::max(body_limit)),
        );

    let router = match &state.config.static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeResponse {
    pub external_id: String,
    pub display_name: String,
    pub total_uploads: u64,
    pub cooldown_remaining_seconds: u64,
    pub recent_uploads: Vec<RecentUpload>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecentUpload {
    pub stored_filename: String,
    pub original_filename: String,
    pub file_size: u64,
    pub uploaded_at: DateTime<Utc>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /
///
/// Logged-in visitors go straight to the upload page.
async fn home(State(state): State<AppState>, cookies: Cookies, request: Request) -> Response {
    if current_session(&cookies, &state.db, Utc::now()).is_some() {
        return Redirect::to(UPLOAD_PAGE).into_response();
    }
    static_page(&state, "index.html", request).await
}

/// GET /upload
async fn upload_page(State(state): State<AppState>, cookies: Cookies, request: Request) -> Response {
    if current_session(&cookies, &state.db, Utc::now()).is_none() {
        info!(path = UPLOAD_PAGE, "Authentication required, redirecting to landing page");
        return Redirect::to("/").into_response();
    }
    static_page(&state, "upload.html", request).await
}

async fn static_page(state: &AppState, file: &str, request: Request) -> Response {
    let Some(dir) = &state.config.static_dir else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match ServeFile::new(dir.join(file)).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

/// GET /auth/login
async fn login(State(state): State<AppState>, cookies: Cookies) -> Result<Redirect, ServerError> {
    let nonce = issue_state_cookie(&cookies, state.config.cookie_secure);
    let url = state.provider.authorize_url(&nonce)?;
    Ok(Redirect::temporary(&url))
}

/// GET /auth/callback
async fn callback(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, ServerError> {
    let expected = take_state_cookie(&cookies);

    if let Some(error) = params.error {
        info!(error = %error, "Login cancelled at provider");
        return Err(ServerError::BadRequest(format!("login failed: {error}")));
    }

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ServerError::BadRequest("missing code".into()))?;

    if !state_matches(expected.as_deref(), params.state.as_deref()) {
        warn!("OAuth state mismatch");
        return Err(ServerError::BadRequest("invalid state".into()));
    }

    let token = state.provider.exchange(&code).await?;
    let identity = state.provider.fetch_identity(&token).await?;
    let memberships = state.provider.fetch_memberships(&token).await?;

    if !is_member_of_allowed(&memberships, &state.config.allowed_server_ids) {
        warn!(external_id = %identity.id, "Login refused: not a member of an allowed server");
        return Err(ServerError::Forbidden(
            "you are not a member of an allowed server".into(),
        ));
    }

    let now = Utc::now();
    let session = {
        let db = lock_db(&state.db);
        db.upsert_identity(&identity.id, &identity.username, now)?;
        db.create_session(&identity.id, &identity.username, state.config.session_max_age, now)?
    };

    set_session_cookie(&cookies, &session, state.config.cookie_secure);
    info!(external_id = %identity.id, name = %identity.username, "Login successful");

    Ok(Redirect::to(&state.config.post_login_redirect))
}

fn state_matches(expected: Option<&str>, got: Option<&str>) -> bool {
    match (expected, got) {
        (Some(expected), Some(got)) if !expected.is_empty() => {
            expected.len() == got.len() && expected.as_bytes().ct_eq(got.as_bytes()).unwrap_u8() == 1
        }
        _ => false,
    }
}

/// GET /auth/logout
async fn logout(State(state): State<AppState>, cookies: Cookies) -> Redirect {
    if let Some(cookie) = cookies.get(SESSION_COOKIE) {
        if let Err(e) = lock_db(&state.db).delete_session(cookie.value()) {
            warn!(error = %e, "Failed to delete session");
        }
    }
    clear_session_cookie(&cookies);
    Redirect::to("/")
}

/// GET /api/me
async fn me(State(state): State<AppState>, cookies: Cookies) -> Result<Json<MeResponse>, ServerError> {
    let now = Utc::now();
    let session = current_session(&cookies, &state.db, now).ok_or(ServerError::Unauthenticated)?;

    let (identity, total_uploads, recent) = {
        let db = lock_db(&state.db);
        let identity = db.get_or_create_identity(&session.external_id, &session.display_name, now)?;
        let total = db.count_uploads(&session.external_id)?;
        let recent = db.list_uploads(&session.external_id, RECENT_UPLOADS)?;
        (identity, total, recent)
    };

    let cooldown = state.admission.cooldown_for(&identity, now);

    Ok(Json(MeResponse {
        external_id: identity.external_id,
        display_name: identity.display_name,
        total_uploads,
        cooldown_remaining_seconds: cooldown.remaining_secs(),
        recent_uploads: recent
            .into_iter()
            .map(|r| RecentUpload {
                stored_filename: r.stored_filename,
                original_filename: r.original_filename,
                file_size: r.file_size,
                uploaded_at: r.uploaded_at,
            })
            .collect(),
    }))
}

/// POST /api/upload
async fn upload(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AdmissionError> {
    let now = Utc::now();
    let session = current_session(&cookies, &state.db, now).ok_or(AdmissionError::Unauthenticated)?;
    let uploader = Uploader::from(&session);

    // Content-Length covers the multipart framing too; the streamed copy
    // enforces the exact file limit.
    let declared_size = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|len| len.saturating_sub(MULTIPART_OVERHEAD as u64));
    state.admission.precheck(&uploader, declared_size)?;

    let mut multipart = multipart.map_err(|e| AdmissionError::MalformedUpload(e.body_text()))?;
    let to_admission_error = multipart_error(state.admission.policy().max_file_size());

    while let Some(field) = multipart.next_field().await.map_err(to_admission_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(AdmissionError::MissingFile);
        }

        let file = IncomingFile {
            file_name,
            body: field.map(move |chunk| chunk.map_err(to_admission_error)),
        };
        let admitted = state.admission.admit(&uploader, declared_size, file, now).await?;

        return Ok(Json(UploadResponse {
            success: true,
            message: "Upload successful".to_string(),
            stored_filename: Some(admitted.record.stored_filename),
            total_uploads: admitted.total_uploads,
            cooldown_remaining_seconds: None,
        }));
    }

    Err(AdmissionError::MissingFile)
}

/// Body-limit hits become `PayloadTooLarge`, everything else a malformed request.
fn multipart_error(max: u64) -> impl Fn(MultipartError) -> AdmissionError + Copy {
    move |e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AdmissionError::PayloadTooLarge { max }
        } else {
            AdmissionError::MalformedUpload(e.body_text())
        }
    }
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_matches() {
        assert!(state_matches(Some("abc"), Some("abc")));
        assert!(!state_matches(Some("abc"), Some("abd")));
        assert!(!state_matches(Some("abc"), Some("ab")));
        assert!(!state_matches(None, Some("abc")));
        assert!(!state_matches(Some("abc"), None));
        assert!(!state_matches(Some(""), Some("")));
    }
}
