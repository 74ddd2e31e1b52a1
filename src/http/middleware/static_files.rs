//! Static asset serving.
//!
//! `GET` and `HEAD` requests are first offered to the static directory. Only a
//! 404 from the directory falls through to route dispatch.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use tower::ServiceExt;
use tower_http::services::ServeDir;

/// Stage 11: serve files from the static directory before dynamic routes.
pub async fn serve_static(State(dir): State<ServeDir>, request: Request, next: Next) -> Response {
    if !matches!(*request.method(), Method::GET | Method::HEAD) {
        return next.run(request).await;
    }

    let mut probe = Request::new(Body::empty());
    *probe.method_mut() = request.method().clone();
    *probe.uri_mut() = request.uri().clone();
    *probe.headers_mut() = request.headers().clone();

    let response = match dir.oneshot(probe).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    if response.status() == StatusCode::NOT_FOUND {
        next.run(request).await
    } else {
        response.map(Body::new)
    }
}
