//! Query-operator sanitization.
//!
//! Strips object keys that a document-style filter would interpret as
//! operators or nested paths: keys starting with `$` or containing `.`.
//! Applies to the decoded JSON body and to query parameters, where bracketed
//! keys (`filter[$gt]`) are checked segment by segment.

use axum::{extract::Request, middleware::Next, response::Response};
use serde_json::Value;

use crate::http::error::ApiResult;
use crate::http::middleware::body::{replace_json_body, JsonBody};
use crate::http::params::{query_pairs, set_query};

/// Whether a single key segment is operator-like.
pub fn is_operator_key(key: &str) -> bool {
    key.starts_with('$') || key.contains('.')
}

/// Whether a query key (possibly bracketed) contains an operator segment.
pub fn is_operator_param(key: &str) -> bool {
    key.split(['[', ']'])
        .filter(|segment| !segment.is_empty())
        .any(is_operator_key)
}

/// Remove operator keys recursively. Returns how many keys were removed.
pub fn strip_operator_keys(value: &mut Value) -> usize {
    match value {
        Value::Object(map) => {
            let before = map.len();
            map.retain(|key, _| !is_operator_key(key));
            let mut removed = before - map.len();
            for nested in map.values_mut() {
                removed += strip_operator_keys(nested);
            }
            removed
        }
        Value::Array(items) => items.iter_mut().map(strip_operator_keys).sum(),
        _ => 0,
    }
}

/// Stage 5: sanitize body and query against operator injection.
pub async fn sanitize_operators(mut request: Request, next: Next) -> ApiResult<Response> {
    if let Some(JsonBody(mut body)) = request.extensions().get::<JsonBody>().cloned() {
        let removed = strip_operator_keys(&mut body);
        if removed > 0 {
            tracing::warn!(removed, path = %request.uri().path(), "Stripped operator keys from body");
            replace_json_body(&mut request, body)?;
        }
    }

    let pairs = query_pairs(request.uri());
    if pairs.iter().any(|(key, _)| is_operator_param(key)) {
        let kept: Vec<_> = pairs
            .into_iter()
            .filter(|(key, _)| !is_operator_param(key))
            .collect();
        tracing::warn!(path = %request.uri().path(), "Stripped operator keys from query");
        set_query(&mut request, &kept)?;
    }

    Ok(next.run(request).await)
}
