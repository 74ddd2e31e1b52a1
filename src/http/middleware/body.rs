//! Structured body decoding.
//!
//! JSON bodies are buffered, parsed and attached as a [`JsonBody`] extension
//! before any later stage runs. A malformed payload never gets past this
//! stage. The raw bytes are re-attached so handlers may still read the body.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use http_body_util::LengthLimitError;
use serde_json::Value;

use crate::http::error::{ApiError, ApiResult};
use crate::observability::metrics;

/// Decoded JSON payload of the current request.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonBody(pub Value);

/// Byte limit applied to buffered bodies.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimit(pub usize);

/// Stage 1: decode `application/json` bodies.
pub async fn decode_json_body(
    State(BodyLimit(limit)): State<BodyLimit>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    if !is_json(request.headers()) {
        return Ok(next.run(request).await);
    }

    let (mut parts, body) = request.into_parts();
    let bytes = buffer(body, limit).await.inspect_err(|_| {
        metrics::record_rejection("body_decoding");
    })?;

    if !bytes.is_empty() {
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
            metrics::record_rejection("body_decoding");
            ApiError::MalformedBody(e.to_string())
        })?;
        parts.extensions.insert(JsonBody(value));
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

/// Buffer a body up to `limit` bytes.
pub(crate) async fn buffer(body: Body, limit: usize) -> ApiResult<Bytes> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        let inner = e.into_inner();
        let over_limit = inner.is::<LengthLimitError>()
            || std::error::Error::source(inner.as_ref()).is_some_and(|s| s.is::<LengthLimitError>());
        if over_limit {
            ApiError::PayloadTooLarge
        } else {
            ApiError::MalformedBody(inner.to_string())
        }
    })
}

/// Replace the decoded JSON payload, keeping the body bytes in sync.
pub(crate) fn replace_json_body(request: &mut Request, value: Value) -> ApiResult<()> {
    let bytes = serde_json::to_vec(&value).map_err(|e| ApiError::internal(e.to_string()))?;
    replace_body(request, Bytes::from(bytes));
    request.extensions_mut().insert(JsonBody(value));
    Ok(())
}

/// Replace the body bytes and fix up `Content-Length`.
pub(crate) fn replace_body(request: &mut Request, bytes: Bytes) {
    request
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    *request.body_mut() = Body::from(bytes);
}

/// Essence of the `Content-Type` header, lowercased.
pub(crate) fn media_type(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let essence = value.split(';').next()?.trim().to_ascii_lowercase();
    Some(essence)
}

pub(crate) fn is_json(headers: &HeaderMap) -> bool {
    media_type(headers).is_some_and(|m| m == "application/json" || m.ends_with("+json"))
}
