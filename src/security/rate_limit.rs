//! Per-client request rate limiting.
//!
//! Each client identity gets a window of fixed length that opens with its
//! first request. Within a window the first `max_requests` requests pass and
//! the rest are refused until the window has elapsed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::http::error::{ApiError, ApiResult};
use crate::observability::metrics;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Identity used when the peer address is unknown.
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    count: u32,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request fits in the current window.
    Allowed { remaining: u32 },
    /// The window is exhausted; retry after the given delay.
    Limited { retry_after: Duration },
}

/// Counter per identity per window.
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            max_requests,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(Duration::from_secs(config.window_secs), config.max_requests)
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Count a request from `identity` now.
    pub fn check(&self, identity: &str) -> Decision {
        self.check_at(identity, Instant::now())
    }

    /// Count a request from `identity` at `now`.
    ///
    /// The entry stays locked for the whole read-modify-write, so concurrent
    /// requests from the same identity are counted exactly.
    pub fn check_at(&self, identity: &str, now: Instant) -> Decision {
        let mut entry = self
            .windows
            .entry(identity.to_string())
            .or_insert(Window { opened: now, count: 0 });

        let elapsed = now.saturating_duration_since(entry.opened);
        if elapsed >= self.window {
            *entry = Window { opened: now, count: 0 };
        }

        if entry.count < self.max_requests {
            entry.count += 1;
            Decision::Allowed {
                remaining: self.max_requests - entry.count,
            }
        } else {
            let elapsed = now.saturating_duration_since(entry.opened);
            Decision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            }
        }
    }

    /// Drop windows that have fully elapsed. Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.opened) < self.window);
        before.saturating_sub(self.windows.len())
    }

    /// Number of identities with an open window.
    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }
}

/// Peer IP of the request, or [`UNKNOWN_CLIENT`].
pub fn client_identity(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Stage 9: enforce the per-client request quota.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let identity = client_identity(&request);

    match limiter.check(&identity) {
        Decision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limiter.max_requests()));
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
            Ok(response)
        }
        Decision::Limited { retry_after } => {
            tracing::warn!(client = %identity, "Rate limit exceeded");
            metrics::record_rate_limited();
            metrics::record_rejection("rate_limit");
            Err(ApiError::RateLimited {
                retry_after_secs: retry_after.as_secs_f64().ceil() as u64,
            })
        }
    }
}
