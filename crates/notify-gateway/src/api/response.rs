//! Response types and error handling for HTTP endpoints
//!
//! Every rejection renders as `{"error": {"code", "message", "details"?}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use notify_common::{AppError, TransportKind};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

/// API error type for consistent error responses
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    App(#[from] AppError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Origin not allowed")]
    OriginNotAllowed,

    #[error("Connection limit reached")]
    CapacityExceeded,

    #[error("Transport not enabled: {0}")]
    TransportDisabled(TransportKind),

    #[error("Connection closed: {0}")]
    ConnectionGone(String),

    #[error("Another poll is already waiting on this connection")]
    PollInProgress,

    #[error("Connection belongs to another user")]
    ConnectionForbidden,
}

impl ApiError {
    /// Get HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::App(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Validation(_) | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::OriginNotAllowed | Self::ConnectionForbidden => StatusCode::FORBIDDEN,
            Self::CapacityExceeded => StatusCode::SERVICE_UNAVAILABLE,
            Self::TransportDisabled(_) => StatusCode::NOT_FOUND,
            Self::ConnectionGone(_) => StatusCode::GONE,
            Self::PollInProgress => StatusCode::CONFLICT,
        }
    }

    /// Get error code for API responses
    #[must_use]
    pub fn error_code(&self) -> &str {
        match self {
            Self::App(e) => e.error_code(),
            Self::Validation(_) | Self::InvalidBody(_) => "INVALID_ARGUMENT",
            Self::OriginNotAllowed => "ORIGIN_NOT_ALLOWED",
            Self::CapacityExceeded => "CAPACITY_EXCEEDED",
            Self::TransportDisabled(_) => "TRANSPORT_DISABLED",
            Self::ConnectionGone(_) => "CONNECTION_GONE",
            Self::PollInProgress => "POLL_IN_PROGRESS",
            Self::ConnectionForbidden => "CONNECTION_FORBIDDEN",
        }
    }

    pub fn invalid_body(msg: impl Into<String>) -> Self {
        Self::InvalidBody(msg.into())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Error detail for API responses
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();
        let message = self.to_string();

        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!(error = ?self, "Server error occurred");
        }

        let details = if let Self::Validation(errors) = &self {
            Some(serde_json::to_value(errors).unwrap_or_default())
        } else {
            None
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
