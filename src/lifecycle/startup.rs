//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the data store
//! - Assemble the request pipeline
//! - Resolve the port and bind the listener
//! - Hand over to the server until it closes
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Steps run in order, never concurrently
//! - The listener binds last, so no traffic arrives before the pipeline is ready

use std::sync::Arc;

use thiserror::Error;

use crate::config::ProcessConfig;
use crate::http::pipeline::{assemble, AssembleError, AssembledPipeline, PipelinePlan};
use crate::http::server::{self, AppState};
use crate::lifecycle::state::TransitionError;
use crate::lifecycle::supervisor::LifecycleSupervisor;
use crate::net::{resolve_port, Listener, PortError, PortProbe};
use crate::routing::RouteTable;
use crate::store::{DataStoreConnector, StoreError};

/// Fatal error before the listener accepts.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to assemble pipeline: {0}")]
    Pipeline(#[from] AssembleError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Lifecycle(#[from] TransitionError),
}

/// Outcome of the steps between store connect and serving.
enum Prepared {
    Serve(Listener, AssembledPipeline),
    /// Bind failed; the supervisor already recorded why.
    Exit(u8),
}

/// Run the service from a loaded configuration to a closed listener.
///
/// Returns the process exit code.
pub async fn run(
    config: Arc<ProcessConfig>,
    connector: &dyn DataStoreConnector,
    probe: &dyn PortProbe,
    groups: &RouteTable,
    supervisor: &LifecycleSupervisor,
) -> Result<u8, StartupError> {
    let store = connector
        .connect(&config.data_store_uri)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Data store connection failed"))?;
    tracing::info!(host = %store.host(), "Data store connected");

    let state = AppState::new(Arc::clone(&config), store);

    // Past this point the store is closed on every exit path, by `serve` or here.
    match prepare(&state, probe, groups, supervisor).await {
        Ok(Prepared::Serve(listener, pipeline)) => {
            Ok(server::serve(listener, pipeline, state, supervisor).await?)
        }
        Ok(Prepared::Exit(code)) => {
            state.store.close().await;
            Ok(code)
        }
        Err(e) => {
            state.store.close().await;
            Err(e)
        }
    }
}

async fn prepare(
    state: &AppState,
    probe: &dyn PortProbe,
    groups: &RouteTable,
    supervisor: &LifecycleSupervisor,
) -> Result<Prepared, StartupError> {
    let config = &state.config;
    let plan = PipelinePlan::standard(config.run_mode);
    let pipeline = assemble(state, &plan, groups).await?;

    let port = resolve_port(config.preferred_port, probe).await?;
    let listener = match Listener::bind(config.server.listener.host, port).await {
        Ok(listener) => listener,
        Err(e) => return Ok(Prepared::Exit(supervisor.on_bind_failed(&e)?)),
    };
    supervisor.on_bound(listener.port())?;

    Ok(Prepared::Serve(listener, pipeline))
}
