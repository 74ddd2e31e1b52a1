//! In-flight request tracking for graceful drain.
//!
//! # Responsibilities
//! - Count requests currently inside the pipeline
//! - Let the drain wait until that count reaches zero

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tokio::sync::watch;

/// Tracks in-flight requests.
///
/// Uses a watch channel so waiters wake when the count changes instead of
/// polling.
#[derive(Debug, Clone)]
pub struct InFlightTracker {
    count: Arc<AtomicU64>,
    changed: Arc<watch::Sender<u64>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            count: Arc::new(AtomicU64::new(0)),
            changed: Arc::new(tx),
        }
    }

    /// Record a new request. Returns a guard that decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        let now = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        self.changed.send_replace(now);
        InFlightGuard {
            tracker: self.clone(),
        }
    }

    pub fn in_flight(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait until no request is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.changed.subscribe();
        // The closure reads the counter itself, so a change that raced the
        // subscription is still observed.
        let _ = rx.wait_for(|_| self.in_flight() == 0).await;
    }
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard for one in-flight request.
#[derive(Debug)]
pub struct InFlightGuard {
    tracker: InFlightTracker,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let now = self.tracker.count.fetch_sub(1, Ordering::SeqCst) - 1;
        self.tracker.changed.send_replace(now);
        tracing::trace!(in_flight = now, "Request finished");
    }
}

/// Middleware holding an [`InFlightGuard`] for the life of each request.
pub async fn track_in_flight(
    State(tracker): State<InFlightTracker>,
    request: Request,
    next: Next,
) -> Response {
    let _guard = tracker.track();
    next.run(request).await
}
