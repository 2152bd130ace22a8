//! Application error types and HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::store::StoreError;

/// Error model used throughout configuration, request parsing and validation.
///
/// Pipeline failures never surface here: they are recorded on the job itself.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{message}")]
    InvalidRequest {
        message: String,
        param: Option<String>,
        code: Option<String>,
        status: StatusCode,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{0}")]
    BadMultipart(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Creates a `401 Unauthorized` error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Creates an `invalid_request_error` payload with status `400`.
    pub fn invalid_request(
        message: impl Into<String>,
        param: Option<&str>,
        code: Option<&str>,
    ) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            param: param.map(ToOwned::to_owned),
            code: code.map(ToOwned::to_owned),
            status: StatusCode::BAD_REQUEST,
        }
    }

    /// Creates a `404 Not Found` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a `409 Conflict` error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a `415 Unsupported Media Type` style error.
    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::UnsupportedMediaType(message.into())
    }

    /// Creates a multipart parsing/shape validation error.
    pub fn bad_multipart(message: impl Into<String>) -> Self {
        Self::BadMultipart(message.into())
    }

    /// Creates a generic internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::JobNotFound(_) | StoreError::UserNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            StoreError::JobFinished(_) => Self::Conflict(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl ErrorBody {
    fn new(message: String, error_type: &str, param: Option<&str>, code: Option<&str>) -> Self {
        Self {
            message,
            error_type: error_type.to_string(),
            param: param.map(ToOwned::to_owned),
            code: code.map(ToOwned::to_owned),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorBody::new(
                    message,
                    "authentication_error",
                    None,
                    Some("invalid_api_key"),
                ),
            ),
            AppError::InvalidRequest {
                message,
                param,
                code,
                status,
            } => (
                status,
                ErrorBody {
                    message,
                    error_type: "invalid_request_error".to_string(),
                    param,
                    code,
                },
            ),
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorBody::new(message, "invalid_request_error", None, Some("not_found")),
            ),
            AppError::Conflict(message) => (
                StatusCode::CONFLICT,
                ErrorBody::new(message, "invalid_request_error", None, Some("conflict")),
            ),
            AppError::UnsupportedMediaType(message) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ErrorBody::new(
                    message,
                    "invalid_request_error",
                    Some("file"),
                    Some("unsupported_media_type"),
                ),
            ),
            AppError::BadMultipart(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new(
                    message,
                    "invalid_request_error",
                    Some("file"),
                    Some("invalid_multipart"),
                ),
            ),
            AppError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(message, "server_error", None, Some("internal_error")),
            ),
        };

        (status, Json(ErrorPayload { error: body })).into_response()
    }
}
