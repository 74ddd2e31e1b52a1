//! vidshare-server
//!
//! Boots the video sharing API: configuration, data store, request pipeline,
//! listener, and supervised shutdown.
//!
//! ```text
//!   env + config/.env ──▶ ConfigLoader ──▶ PgConnector ──▶ PipelineAssembler
//!                                                               │
//!   SIGINT/SIGTERM ──▶ LifecycleSupervisor ◀── Listener ◀── PortResolver
//! ```
//!
//! Exit status is 0 after a signal-initiated shutdown and 1 after any fatal
//! startup or asynchronous error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use vidshare_server::config::{self, loader};
use vidshare_server::lifecycle::{self, LifecycleSupervisor, OsSignals};
use vidshare_server::net::TcpProbe;
use vidshare_server::observability::{logging, metrics};
use vidshare_server::routing::RouteTable;
use vidshare_server::store::PgConnector;

#[derive(Debug, Parser)]
#[command(name = "vidshare-server", version, about = "Video sharing API server")]
struct Cli {
    /// Tunables file.
    #[arg(long, env = "CONFIG_FILE", default_value = "config/server.toml")]
    config: PathBuf,

    /// Dotenv file loaded before reading the environment.
    #[arg(long, default_value = "config/.env")]
    env_file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let env_loaded = loader::load_env_file(&cli.env_file);

    if let Err(e) = logging::init_logging(loader::detect_run_mode()) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match env_loaded {
        Ok(true) => tracing::debug!(path = %cli.env_file.display(), "Loaded env file"),
        Ok(false) => {}
        Err(e) => {
            tracing::error!(error = %e, "Failed to load env file");
            return ExitCode::FAILURE;
        }
    }

    let config = match config::load(&cli.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(error = %e, "Configuration rejected");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        run_mode = %config.run_mode,
        preferred_port = config.preferred_port,
        "vidshare-server starting"
    );

    if let Some(addr) = &config.server.observability.metrics_address {
        let started = addr
            .parse()
            .map_err(|e: std::net::AddrParseError| e.to_string())
            .and_then(|addr| metrics::init_metrics(addr).map_err(|e| e.to_string()));
        if let Err(e) = started {
            tracing::error!(error = %e, metrics_address = %addr, "Failed to start metrics exporter");
            return ExitCode::FAILURE;
        }
    }

    let signals = match OsSignals::register() {
        Ok(signals) => signals,
        Err(e) => {
            tracing::error!(error = %e, "Failed to register signal handlers");
            return ExitCode::FAILURE;
        }
    };

    let supervisor = Arc::new(LifecycleSupervisor::new());
    let watcher = supervisor.spawn_watch(Some(signals));

    let connector = PgConnector::new(config.server.database.clone());
    let probe = TcpProbe::new(config.server.listener.host);
    let groups = RouteTable::placeholders();

    let outcome = lifecycle::run(config, &connector, &probe, &groups, &supervisor).await;
    watcher.abort();

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            ExitCode::FAILURE
        }
    }
}
