//! API error types.

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::http::header::WWW_AUTHENTICATE;
use axum::response::{IntoResponse, Response};
use certfolio_auth::AuthError;
use certfolio_metadata::MetadataError;
use certfolio_storage::StorageError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("{0}")]
    Core(#[from] certfolio_core::Error),

    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::Internal(_) => "internal_error",
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => "not_found",
                StorageError::UnsupportedMediaType(_) => "unsupported_media_type",
                StorageError::EmptyAttachment => "empty_attachment",
                StorageError::PayloadTooLarge { .. } => "payload_too_large",
                StorageError::InvalidKey(_) => "invalid_key",
                _ => "storage_error",
            },
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => "not_found",
                MetadataError::AlreadyExists(_) => "conflict",
                _ => "metadata_error",
            },
            Self::Core(e) => match e {
                certfolio_core::Error::InvalidDate(_) => "invalid_date",
                certfolio_core::Error::InvalidDateRange { .. } => "invalid_date_range",
                certfolio_core::Error::InvalidField { .. } => "invalid_field",
                certfolio_core::Error::Serialization(_) => "internal_error",
            },
            Self::Auth(e) => match e {
                AuthError::InvalidCredentials => "invalid_credentials",
                AuthError::TokenExpired => "token_expired",
                AuthError::InvalidToken(_) => "invalid_token",
                _ => "auth_error",
            },
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::UnsupportedMediaType(_)
                | StorageError::EmptyAttachment
                | StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                StorageError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(certfolio_core::Error::Serialization(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Core(_) => StatusCode::BAD_REQUEST,
            Self::Auth(e) => match e {
                AuthError::InvalidCredentials
                | AuthError::TokenExpired
                | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(e.body_text())
        } else {
            Self::BadRequest(format!("invalid multipart body: {}", e.body_text()))
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        if status == StatusCode::UNAUTHORIZED {
            (status, [(WWW_AUTHENTICATE, "Bearer")], Json(body)).into_response()
        } else {
            (status, Json(body)).into_response()
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
