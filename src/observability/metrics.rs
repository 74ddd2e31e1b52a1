//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_rejected_total` (counter): requests short-circuited by a stage, by stage
//! - `http_errors_total` (counter): error responses rendered, by status
//! - `rate_limited_total` (counter): requests refused by the rate limiter
//!
//! # Design Decisions
//! - Exporter is optional; without it every update is a no-op

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) -> Result<(), metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record a request short-circuited by a pipeline stage.
pub fn record_rejection(stage: &'static str) {
    metrics::counter!("http_requests_rejected_total", "stage" => stage).increment(1);
}

/// Record an error response rendered by the error responder.
pub fn record_error(status: u16) {
    metrics::counter!("http_errors_total", "status" => status.to_string()).increment(1);
}

/// Record a request refused by the rate limiter.
pub fn record_rate_limited() {
    metrics::counter!("rate_limited_total").increment(1);
}
