//! Client-facing request errors.
//!
//! Every stage and route group reports failure as an [`ApiError`]. Rendering
//! one produces the structured body `{"success": false, "error": "..."}` and
//! marks the response so the terminal error responder leaves it alone.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::metrics;

/// Message sent in place of any server-side failure detail.
pub const SERVER_ERROR_MESSAGE: &str = "Server Error";

/// Result type for stages and handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error raised by a pipeline stage or route-group handler.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Malformed JSON body: {0}")]
    MalformedBody(String),

    #[error("Malformed form body")]
    MalformedForm,

    #[error("Malformed upload: {0}")]
    MalformedUpload(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Too many requests, please try again later.")]
    RateLimited { retry_after_secs: u64 },

    #[error("Route {0} not found")]
    NotFound(String),

    #[error("{0} is not available yet")]
    NotImplemented(String),

    /// An error with an explicit status, e.g. raised by a route group.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// Internal failure. The detail is logged, never sent.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedBody(_) | ApiError::MalformedForm | ApiError::MalformedUpload(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Status { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the client.
    pub fn client_message(&self) -> String {
        let status = self.status();
        match self {
            ApiError::Internal(_) => SERVER_ERROR_MESSAGE.to_string(),
            ApiError::Status { .. } if status.is_server_error() => SERVER_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

/// Structured error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

/// Response extension marking a body already rendered by [`ApiError`].
#[derive(Debug, Clone, Copy)]
pub struct ErrorRendered;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }
        metrics::record_error(status.as_u16());

        let body = Json(ErrorBody {
            success: false,
            error: self.client_message(),
        });

        let mut response = (status, body).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response.extensions_mut().insert(ErrorRendered);
        response
    }
}
