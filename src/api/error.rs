use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use crate::queue::QueueError;
use crate::safety::SafetyError;

use super::models::ErrorResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("URL blocked: {0}")]
    SsrfBlocked(String),
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("PDF file not found (may have been cleaned up)")]
    ArtifactCleaned,
    #[error("job is not ready for download, current status: {0}")]
    JobNotReady(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            ApiError::SsrfBlocked(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ArtifactCleaned => StatusCode::NOT_FOUND,
            ApiError::JobNotReady(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidUrl(_) => "INVALID_URL",
            ApiError::SsrfBlocked(_) => "SSRF_BLOCKED",
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::ArtifactCleaned => "ARTIFACT_CLEANED",
            ApiError::JobNotReady(_) => "JOB_NOT_READY",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        (status, Json(json!(body))).into_response()
    }
}

impl From<SafetyError> for ApiError {
    fn from(value: SafetyError) -> Self {
        if value.is_ssrf() {
            ApiError::SsrfBlocked(value.to_string())
        } else {
            ApiError::InvalidUrl(value.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

impl From<QueueError> for ApiError {
    fn from(value: QueueError) -> Self {
        ApiError::Internal(value.to_string())
    }
}
