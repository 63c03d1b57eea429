//! Error types for copydesk-server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use copydesk_common::Error;
use serde_json::json;
use thiserror::Error as ThisError;

/// API error type
#[derive(Debug, ThisError)]
pub enum ApiError {
    /// Error from the common taxonomy; status code derived per variant
    #[error(transparent)]
    Common(#[from] Error),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or invalid webhook credentials (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Endpoint belongs to a disabled feature (404)
    #[error("Feature '{0}' is disabled")]
    FeatureDisabled(String),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, existing_id) = match self {
            ApiError::Common(err) => {
                let existing_id = match &err {
                    Error::DuplicateContent { existing_id } => Some(*existing_id),
                    _ => None,
                };
                let (status, code) = match &err {
                    Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    Error::InvalidStateTransition(_) => {
                        (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION")
                    }
                    Error::DuplicateContent { .. } => (StatusCode::CONFLICT, "DUPLICATE_CONTENT"),
                    Error::ContentNotReady(_) => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "CONTENT_NOT_READY")
                    }
                    Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
                    Error::ExternalUnavailable(_) => (StatusCode::BAD_GATEWAY, "EXTERNAL_UNAVAILABLE"),
                    Error::ExternalFailure(_) => (StatusCode::BAD_GATEWAY, "EXTERNAL_FAILURE"),
                    Error::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
                    Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                    }
                };
                (status, code, err.to_string(), existing_id)
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg, None),
            ApiError::FeatureDisabled(name) => (
                StatusCode::NOT_FOUND,
                "FEATURE_DISABLED",
                format!("Feature '{}' is disabled", name),
                None,
            ),
            ApiError::Other(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
                None,
            ),
        };

        let mut error = json!({
            "code": error_code,
            "message": message,
        });
        if let Some(id) = existing_id {
            error["existing_id"] = json!(id);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
