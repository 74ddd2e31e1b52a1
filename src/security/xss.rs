//! Cross-site-scripting input scrubbing.
//!
//! Escapes `<` and `>` in every string of the JSON body and in every query
//! value, so markup submitted by a client is stored inert.

use std::borrow::Cow;

use axum::{extract::Request, middleware::Next, response::Response};
use serde_json::Value;

use crate::http::error::ApiResult;
use crate::http::middleware::body::{replace_json_body, JsonBody};
use crate::http::params::{query_pairs, set_query};

/// Escape angle brackets. Borrows when there is nothing to escape.
pub fn escape_markup(input: &str) -> Cow<'_, str> {
    if !input.contains(['<', '>']) {
        return Cow::Borrowed(input);
    }
    let mut escaped = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

/// Escape every string value in place. Returns how many strings changed.
pub fn scrub_value(value: &mut Value) -> usize {
    match value {
        Value::String(s) => match escape_markup(s) {
            Cow::Owned(escaped) => {
                *s = escaped;
                1
            }
            Cow::Borrowed(_) => 0,
        },
        Value::Array(items) => items.iter_mut().map(scrub_value).sum(),
        Value::Object(map) => map.values_mut().map(scrub_value).sum(),
        _ => 0,
    }
}

/// Stage 7: scrub markup from body and query.
pub async fn scrub_xss(mut request: Request, next: Next) -> ApiResult<Response> {
    if let Some(JsonBody(mut body)) = request.extensions().get::<JsonBody>().cloned() {
        if scrub_value(&mut body) > 0 {
            replace_json_body(&mut request, body)?;
        }
    }

    let pairs = query_pairs(request.uri());
    if pairs.iter().any(|(_, value)| value.contains(['<', '>'])) {
        let scrubbed: Vec<_> = pairs
            .into_iter()
            .map(|(key, value)| {
                let value = escape_markup(&value).into_owned();
                (key, value)
            })
            .collect();
        set_query(&mut request, &scrubbed)?;
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn escapes_angle_brackets() {
        assert_eq!(
            escape_markup("<script>alert(1)</script>"),
            "&lt;script&gt;alert(1)&lt;/script&gt;"
        );
        assert!(matches!(escape_markup("plain text"), Cow::Borrowed(_)));
    }

    #[test]
    fn scrubs_nested_strings_only() {
        let mut body = json!({
            "text": "<b>hi</b>",
            "likes": 3,
            "replies": [{"text": "<img src=x onerror=alert(1)>"}, {"text": "ok"}]
        });

        assert_eq!(scrub_value(&mut body), 2);
        assert_eq!(body["text"], "&lt;b&gt;hi&lt;/b&gt;");
        assert_eq!(body["replies"][0]["text"], "&lt;img src=x onerror=alert(1)&gt;");
        assert_eq!(body["replies"][1]["text"], "ok");
        assert_eq!(body["likes"], 3);
    }
}
