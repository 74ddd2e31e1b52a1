//! Request pipeline behavior, driven in-process through the assembled router.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    extract::Request,
    http::{header, Method, StatusCode},
    Router,
};
use serde_json::json;
use tower::ServiceExt;

use vidshare_server::config::RunMode;
use vidshare_server::http::pipeline::{assemble, AssembledPipeline, PipelinePlan};
use vidshare_server::routing::RouteTable;

mod common;
use common::{
    body_json, body_text, is_json, EchoGroup, FailingStoreGroup, Fixture, PanickingGroup, ROBOTS_TXT,
    STORE_FAILURE,
};

async fn pipeline(fixture: &Fixture, groups: RouteTable) -> AssembledPipeline {
    let plan = PipelinePlan::standard(fixture.config.run_mode);
    assemble(&fixture.state(), &plan, &groups).await.unwrap()
}

async fn send(router: &Router, request: Request) -> axum::response::Response {
    router.clone().oneshot(request).await.unwrap()
}

/// Log output collected in memory.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Send one request through a freshly assembled pipeline and return the logs.
async fn logs_for_one_request(mode: RunMode) -> String {
    let fixture = Fixture::new(mode);
    let pipeline = pipeline(&fixture, RouteTable::placeholders()).await;

    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);

    let response = send(&pipeline.router, Request::get("/robots.txt").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    drop(guard);

    let bytes = captured.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}

#[tokio::test]
async fn request_logging_runs_only_in_development() {
    let development = logs_for_one_request(RunMode::Development).await;
    assert!(development.contains("finished processing request"), "{development}");

    let production = logs_for_one_request(RunMode::Production).await;
    assert!(!production.contains("finished processing request"), "{production}");
}

#[tokio::test]
async fn malformed_body_stops_at_decoding() {
    let fixture = Fixture::new(RunMode::Development);
    let pipeline = pipeline(&fixture, RouteTable::placeholders().with(EchoGroup("videos"))).await;

    let request = Request::post("/api/v1/videos")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"title": "cats""#))
        .unwrap();
    let response = send(&pipeline.router, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(is_json(&response));
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("Malformed JSON body"));

    // Never reached the rate limiter.
    assert_eq!(pipeline.rate_limiter.tracked_identities(), 0);
}

#[tokio::test]
async fn unknown_route_is_structured_404() {
    let fixture = Fixture::new(RunMode::Production);
    let pipeline = pipeline(&fixture, RouteTable::placeholders()).await;

    let response = send(&pipeline.router, Request::get("/watch/42").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-frame-options"], "SAMEORIGIN");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(!response.headers().contains_key("x-powered-by"));
    assert_eq!(
        body_json(response).await,
        json!({"success": false, "error": "Route /watch/42 not found"})
    );
}

#[tokio::test]
async fn placeholder_groups_answer_not_implemented() {
    let fixture = Fixture::new(RunMode::Production);
    let pipeline = pipeline(&fixture, RouteTable::placeholders()).await;

    for path in ["/api/v1/comments", "/api/v1/search/trending"] {
        let response = send(&pipeline.router, Request::get(path).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED, "{path}");
        assert_eq!(body_json(response).await["success"], false);
    }
}

#[tokio::test]
async fn static_assets_are_served_before_routes() {
    let fixture = Fixture::new(RunMode::Production);
    let pipeline = pipeline(&fixture, RouteTable::placeholders()).await;

    let response = send(&pipeline.router, Request::get("/robots.txt").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "100");
    assert_eq!(body_text(response).await, ROBOTS_TXT);
}

#[tokio::test]
async fn request_content_is_sanitized_before_dispatch() {
    let fixture = Fixture::new(RunMode::Production);
    let pipeline = pipeline(&fixture, RouteTable::placeholders().with(EchoGroup("videos"))).await;

    let request = Request::post("/api/v1/videos?sort=views&sort=%3Cb%3Edate%3C%2Fb%3E&%24where=1")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, "session=abc; theme=dark")
        .body(Body::from(
            r#"{"title": "<script>x</script>", "owner": {"$ne": null}, "profile.admin": true}"#,
        ))
        .unwrap();
    let response = send(&pipeline.router, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "query": {"sort": "&lt;b&gt;date&lt;/b&gt;"},
            "body": {"title": "&lt;script&gt;x&lt;/script&gt;", "owner": {}},
            "cookies": 2
        })
    );
}

#[tokio::test]
async fn hundred_and_first_request_is_rate_limited() {
    let fixture = Fixture::new(RunMode::Production);
    let pipeline = pipeline(&fixture, RouteTable::placeholders().with(EchoGroup("videos"))).await;

    for i in 1..=100 {
        let response = send(&pipeline.router, Request::get("/api/v1/videos").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK, "request {i}");
        assert_eq!(
            response.headers()["x-ratelimit-remaining"],
            (100 - i).to_string().as_str()
        );
    }

    let response = send(&pipeline.router, Request::get("/api/v1/videos").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(
        body_json(response).await["error"],
        "Too many requests, please try again later."
    );
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let fixture = Fixture::new(RunMode::Production);
    let pipeline = pipeline(&fixture, RouteTable::placeholders()).await;

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/videos")
        .header(header::ORIGIN, "https://viewer.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PATCH")
        .body(Body::empty())
        .unwrap();
    let response = send(&pipeline.router, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn handler_panic_becomes_generic_server_error() {
    let fixture = Fixture::new(RunMode::Development);
    let pipeline = pipeline(&fixture, RouteTable::placeholders().with(PanickingGroup)).await;

    let response = send(&pipeline.router, Request::get("/api/v1/feelings").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({"success": false, "error": "Server Error"})
    );
}

#[tokio::test]
async fn handler_json_server_error_is_not_leaked() {
    let fixture = Fixture::new(RunMode::Production);
    let pipeline = pipeline(&fixture, RouteTable::placeholders().with(FailingStoreGroup)).await;

    let response = send(&pipeline.router, Request::get("/api/v1/videos").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(response).await;
    assert!(!body.contains(STORE_FAILURE));
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&body).unwrap(),
        json!({"success": false, "error": "Server Error"})
    );
}

#[tokio::test]
async fn upload_directory_is_created_at_assembly() {
    let fixture = Fixture::new(RunMode::Production);
    let staged = fixture.config.server.http.upload_dir.clone();
    assert!(!staged.exists());

    pipeline(&fixture, RouteTable::placeholders()).await;

    assert!(staged.is_dir());
}

#[tokio::test]
async fn multipart_upload_is_cleaned_up_after_response() {
    let fixture = Fixture::new(RunMode::Production);
    let pipeline = pipeline(&fixture, RouteTable::placeholders().with(EchoGroup("videos"))).await;

    let boundary = "X-VIDSHARE-BOUNDARY";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"title\"\r\n\r\n\
         cats\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"video\"; filename=\"cats.mp4\"\r\n\
         Content-Type: video/mp4\r\n\r\n\
         not really a video\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::post("/api/v1/videos")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    let response = send(&pipeline.router, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let staged = std::fs::read_dir(&fixture.config.server.http.upload_dir).unwrap().count();
    assert_eq!(staged, 0);
}

#[tokio::test]
async fn rejected_uploads_leave_nothing_staged() {
    let fixture = Fixture::new(RunMode::Production);
    let pipeline = pipeline(&fixture, RouteTable::placeholders()).await;

    let boundary = "X-VIDSHARE-BOUNDARY";
    for _ in 0..3 {
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"video\"; filename=\"cats.mp4\"\r\n\
             Content-Type: video/mp4\r\n\r\n\
             not really a video\r\n\
             --{boundary}--\r\n"
        );
        let request = Request::post("/api/v1/videos")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let response = send(&pipeline.router, request).await;
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    let staged = std::fs::read_dir(&fixture.config.server.http.upload_dir).unwrap().count();
    assert_eq!(staged, 0);
}
