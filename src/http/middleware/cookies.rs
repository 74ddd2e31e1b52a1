//! Cookie extraction.

use std::collections::HashMap;

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use cookie::Cookie;

/// Cookies sent with the current request, percent-decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookies(HashMap<String, String>);

impl Cookies {
    /// Parse every `Cookie` header. Malformed pairs are skipped.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let jar = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse_encoded)
            .filter_map(Result::ok)
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        Self(jar)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Stage 2: attach a [`Cookies`] extension. Never fails.
pub async fn extract_cookies(mut request: Request, next: Next) -> Response {
    let cookies = Cookies::from_headers(request.headers());
    request.extensions_mut().insert(cookies);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn parses_multiple_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("token=abc; theme=dark"));
        headers.append(header::COOKIE, HeaderValue::from_static("name=J%C3%BCrgen"));

        let cookies = Cookies::from_headers(&headers);
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies.get("token"), Some("abc"));
        assert_eq!(cookies.get("name"), Some("Jürgen"));
        assert_eq!(cookies.get("missing"), None);
    }

    #[test]
    fn skips_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("novalue; ok=1"));

        let cookies = Cookies::from_headers(&headers);
        assert_eq!(cookies.get("ok"), Some("1"));
    }
}
