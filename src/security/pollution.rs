//! HTTP parameter pollution guard.
//!
//! A parameter repeated in the query string (or in a urlencoded form body)
//! collapses to its last value, so handlers never see an unexpected list.
//! Discarded values are kept in a [`PollutedParams`] extension for anyone
//! who wants to inspect them.

use std::collections::BTreeMap;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::http::error::{ApiError, ApiResult};
use crate::http::middleware::body::{buffer, media_type, replace_body, BodyLimit};
use crate::http::params::{encode_pairs, query_pairs, set_query};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Values dropped during collapsing, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollutedParams {
    pub query: BTreeMap<String, Vec<String>>,
    pub body: BTreeMap<String, Vec<String>>,
}

impl PollutedParams {
    pub fn is_empty(&self) -> bool {
        self.query.is_empty() && self.body.is_empty()
    }
}

/// Collapse repeated keys to their last value.
///
/// Keys keep the position of their first appearance. Returns the collapsed
/// pairs and the values that were dropped.
pub fn collapse_repeated(
    pairs: Vec<(String, String)>,
) -> (Vec<(String, String)>, BTreeMap<String, Vec<String>>) {
    let mut kept: Vec<(String, String)> = Vec::with_capacity(pairs.len());
    let mut dropped: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (key, value) in pairs {
        match kept.iter().position(|(k, _)| *k == key) {
            Some(index) => {
                let previous = std::mem::replace(&mut kept[index].1, value);
                dropped.entry(key).or_default().push(previous);
            }
            None => kept.push((key, value)),
        }
    }

    (kept, dropped)
}

/// Stage 10: collapse repeated query and form parameters.
pub async fn guard_parameter_pollution(
    State(BodyLimit(limit)): State<BodyLimit>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let mut polluted = PollutedParams::default();

    let (query, dropped) = collapse_repeated(query_pairs(request.uri()));
    if !dropped.is_empty() {
        set_query(&mut request, &query)?;
        polluted.query = dropped;
    }

    if media_type(request.headers()).as_deref() == Some(FORM_URLENCODED) {
        let body = std::mem::replace(request.body_mut(), Body::empty());
        let bytes = buffer(body, limit).await.map_err(|e| match e {
            ApiError::PayloadTooLarge => e,
            _ => ApiError::MalformedForm,
        })?;

        let pairs = url::form_urlencoded::parse(&bytes).into_owned().collect();
        let (form, dropped) = collapse_repeated(pairs);
        if dropped.is_empty() {
            replace_body(&mut request, bytes);
        } else {
            replace_body(&mut request, Bytes::from(encode_pairs(&form)));
            polluted.body = dropped;
        }
    }

    if !polluted.is_empty() {
        tracing::debug!(
            path = %request.uri().path(),
            query_keys = polluted.query.len(),
            body_keys = polluted.body.len(),
            "Collapsed repeated parameters"
        );
        request.extensions_mut().insert(polluted);
    }

    Ok(next.run(request).await)
}
