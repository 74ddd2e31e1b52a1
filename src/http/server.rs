//! HTTP server setup and drain.
//!
//! # Responsibilities
//! - Hold the state shared by stages and route groups
//! - Serve the assembled pipeline on a bound listener
//! - Stop accepting on drain, wait for in-flight requests, then close
//! - Run the periodic rate-limit purge as a supervised task
//!
//! # Design Decisions
//! - Connect info is attached so the rate limiter can key on peer IP
//! - Drain ends once the server has stopped and no request is in flight,
//!   or after `drain_timeout_secs`, whichever comes first
//! - The data store handle is closed only after the server has stopped

use std::convert::Infallible;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::middleware::from_fn_with_state;

use crate::config::ProcessConfig;
use crate::http::pipeline::AssembledPipeline;
use crate::lifecycle::shutdown::{spawn_supervised, ShutdownSignal};
use crate::lifecycle::state::TransitionError;
use crate::lifecycle::supervisor::{drain_requested, LifecycleSupervisor};
use crate::net::connection::track_in_flight;
use crate::net::{InFlightTracker, Listener};
use crate::security::RateLimiter;
use crate::store::DataStoreHandle;

/// Application state injected into route groups.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<ProcessConfig>,
    pub store: Arc<DataStoreHandle>,
}

impl AppState {
    pub fn new(config: Arc<ProcessConfig>, store: DataStoreHandle) -> Self {
        Self {
            config,
            store: Arc::new(store),
        }
    }
}

/// Serve until the supervisor asks for a drain, then close.
///
/// Returns the process exit code.
pub async fn serve(
    listener: Listener,
    pipeline: AssembledPipeline,
    state: AppState,
    supervisor: &LifecycleSupervisor,
) -> Result<u8, TransitionError> {
    let listen = &state.config.server.listener;
    let tracker = InFlightTracker::new();
    let app = pipeline
        .router
        .layer(from_fn_with_state(tracker.clone(), track_in_flight));

    let purge = spawn_supervised(
        supervisor.reporter(),
        "rate_limit_purge",
        purge_rate_limits(
            pipeline.rate_limiter,
            Duration::from_secs(state.config.server.rate_limit.purge_interval_secs),
        ),
    );

    let address = listener.local_addr();
    supervisor.on_accepting(state.config.run_mode)?;

    let server = axum::serve(
        listener.into_inner(),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(drain_requested(supervisor.subscribe()))
    .into_future();
    let mut server = std::pin::pin!(server);

    let stopped_early = tokio::select! {
        biased;
        () = drain_requested(supervisor.subscribe()) => None,
        result = &mut server => Some(result),
    };

    match stopped_early {
        Some(result) => {
            let reason = match result {
                Ok(()) => "server stopped unexpectedly".to_string(),
                Err(e) => format!("server error: {e}"),
            };
            supervisor.request_shutdown(ShutdownSignal::Fatal(reason));
        }
        None => {
            tracing::info!(%address, in_flight = tracker.in_flight(), "Draining");
            let timeout = Duration::from_secs(listen.drain_timeout_secs);
            let drained = async {
                let (result, ()) = tokio::join!(&mut server, tracker.wait_idle());
                result
            };
            match tokio::time::timeout(timeout, drained).await {
                Ok(Ok(())) => tracing::debug!("All in-flight requests finished"),
                Ok(Err(e)) => tracing::error!(error = %e, "Server error while draining"),
                Err(_) => tracing::warn!(
                    in_flight = tracker.in_flight(),
                    timeout_secs = listen.drain_timeout_secs,
                    "Drain timed out, closing anyway"
                ),
            }
        }
    }

    purge.abort();
    state.store.close().await;
    supervisor.on_drained()
}

async fn purge_rate_limits(limiter: Arc<RateLimiter>, every: Duration) -> Result<(), Infallible> {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let removed = limiter.purge_expired(Instant::now());
        if removed > 0 {
            tracing::debug!(
                removed,
                tracked = limiter.tracked_identities(),
                "Purged expired rate-limit windows"
            );
        }
    }
}
