//! Query string helpers shared by the rewriting stages.

use axum::{
    extract::Request,
    http::uri::{PathAndQuery, Uri},
};
use url::form_urlencoded;

use crate::http::error::{ApiError, ApiResult};

/// Decoded query pairs in order of appearance.
pub fn query_pairs(uri: &Uri) -> Vec<(String, String)> {
    uri.query()
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

/// Encode pairs as `application/x-www-form-urlencoded`.
pub fn encode_pairs(pairs: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Replace the request's query string, keeping the path.
pub fn set_query(request: &mut Request, pairs: &[(String, String)]) -> ApiResult<()> {
    let path = request.uri().path().to_string();
    let path_and_query = if pairs.is_empty() {
        path
    } else {
        format!("{path}?{}", encode_pairs(pairs))
    };

    let mut parts = request.uri().clone().into_parts();
    parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query).map_err(|e| ApiError::internal(e.to_string()))?,
    );
    *request.uri_mut() = Uri::from_parts(parts).map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn parses_and_decodes() {
        let uri: Uri = "/api/v1/search?q=funny%20cats&page=2".parse().unwrap();
        assert_eq!(
            query_pairs(&uri),
            vec![
                ("q".to_string(), "funny cats".to_string()),
                ("page".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn rewrites_query_and_keeps_path() {
        let mut request = Request::get("/api/v1/videos?a=1&a=2").body(Body::empty()).unwrap();
        set_query(&mut request, &[("a".into(), "2".into())]).unwrap();
        assert_eq!(request.uri(), "/api/v1/videos?a=2");

        set_query(&mut request, &[]).unwrap();
        assert_eq!(request.uri(), "/api/v1/videos");
    }
}
