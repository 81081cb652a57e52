use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gacha_store::StoreError;
use serde::Serialize;
use thiserror::Error;

use crate::cooldown::format_wait;
use crate::oauth::ProviderError;

/// Why an upload was not admitted.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Please wait {} before uploading again", format_wait(.remaining))]
    RateLimited { remaining: Duration },

    #[error("Invalid file type: {0}")]
    InvalidType(String),

    #[error("No file provided")]
    MissingFile,

    #[error("File too large (max {} MB)", .max / (1024 * 1024))]
    PayloadTooLarge { max: u64 },

    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

impl AdmissionError {
    pub fn status(&self) -> StatusCode {
        match self {
            AdmissionError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AdmissionError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AdmissionError::InvalidType(_)
            | AdmissionError::MissingFile
            | AdmissionError::MalformedUpload(_) => StatusCode::BAD_REQUEST,
            AdmissionError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AdmissionError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the uploader. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AdmissionError::StorageFailure(_) => "Failed to save file".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for AdmissionError {
    fn from(e: StoreError) -> Self {
        AdmissionError::StorageFailure(e.to_string())
    }
}

/// Body of every `/api/upload` response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_uploads: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_seconds: Option<u64>,
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let cooldown_remaining_seconds = match &self {
            AdmissionError::RateLimited { remaining } => {
                Some(crate::cooldown::ceil_secs(*remaining))
            }
            _ => None,
        };

        let body = UploadResponse {
            success: false,
            message: self.public_message(),
            stored_filename: None,
            total_uploads: None,
            cooldown_remaining_seconds,
        };

        (self.status(), axum::Json(body)).into_response()
    }
}

/// Errors of the auth and account endpoints.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Identity provider error: {0}")]
    Upstream(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Upstream(e) => {
                tracing::warn!(error = %e, "Identity provider request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "Identity provider unavailable".to_string(),
                )
            }
            ServerError::Storage(e) => {
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
