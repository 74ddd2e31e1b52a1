//! Security response headers.
//!
//! # Responsibilities
//! - Add defensive headers to every response unless a handler set them
//! - Strip `X-Powered-By`
//!
//! # Design Decisions
//! - Handler-set values win over the defaults
//! - Applied on the way out, so error responses are covered too

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

/// Default hardening headers.
pub const SECURITY_HEADERS: &[(&str, &str)] = &[
    (
        "content-security-policy",
        "default-src 'self';base-uri 'self';font-src 'self' https: data:;\
         form-action 'self';frame-ancestors 'self';img-src 'self' data:;\
         object-src 'none';script-src 'self';script-src-attr 'none';\
         style-src 'self' https: 'unsafe-inline';upgrade-insecure-requests",
    ),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

const X_POWERED_BY: &str = "x-powered-by";

/// Apply the defaults to a header map.
pub fn apply_security_headers(headers: &mut HeaderMap) {
    headers.remove(X_POWERED_BY);
    for (name, value) in SECURITY_HEADERS {
        let name = HeaderName::from_static(*name);
        if !headers.contains_key(&name) {
            headers.insert(name, HeaderValue::from_static(*value));
        }
    }
}

/// Stage 6: harden every response.
pub async fn set_security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    apply_security_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[test]
    fn adds_defaults_and_strips_powered_by() {
        let mut headers = HeaderMap::new();
        headers.insert(X_POWERED_BY, HeaderValue::from_static("Express"));

        apply_security_headers(&mut headers);

        assert!(!headers.contains_key(X_POWERED_BY));
        assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers.len(), SECURITY_HEADERS.len());
    }

    #[test]
    fn handler_values_win() {
        let mut headers = HeaderMap::new();
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));

        apply_security_headers(&mut headers);

        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    }
}
