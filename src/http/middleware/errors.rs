//! Terminal error responder.
//!
//! Wraps the whole pipeline, so every outcome passes through it on the way
//! out. Responses already rendered by [`ApiError`] pass untouched. Bare error
//! responses produced by framework layers (timeouts, method mismatch, CORS,
//! extractor rejections) are re-rendered in the structured format. Panics are
//! caught and turned into a generic server error.
//!
//! A handler's own JSON body survives only on 4xx. Any unmarked 5xx is
//! replaced, whatever its content type, so server-side detail never leaves.

use std::any::Any;

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::error::{ApiError, ErrorRendered};
use crate::http::middleware::body::is_json;

/// Stage 13: normalize every error response leaving the pipeline.
pub async fn respond_to_errors(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    normalize(response)
}

/// Re-render bare error responses and unmarked server errors. Anything else
/// is returned as-is.
pub fn normalize(response: Response) -> Response {
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }
    if response.extensions().get::<ErrorRendered>().is_some() {
        return response;
    }
    if status.is_client_error() && is_json(response.headers()) {
        return response;
    }

    let message = status.canonical_reason().unwrap_or("Request failed");
    let (parts, _) = response.into_parts();

    let mut rendered = ApiError::new(status, message).into_response();
    carry_headers(&parts.headers, rendered.headers_mut());
    rendered
}

/// Copy headers set by the failing layer (e.g. `Allow`, `Retry-After`),
/// except those describing the discarded body.
fn carry_headers(from: &HeaderMap, into: &mut HeaderMap) {
    for (name, value) in from {
        if name == header::CONTENT_TYPE || name == header::CONTENT_LENGTH {
            continue;
        }
        into.append(name.clone(), value.clone());
    }
}

/// Panic handler for `CatchPanicLayer`.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic".to_string()
    };
    ApiError::internal(format!("handler panicked: {detail}")).into_response()
}
