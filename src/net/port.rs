//! Listen-port negotiation.
//!
//! # Responsibilities
//! - Prefer the configured port when it is free
//! - Fall back to an OS-assigned ephemeral port otherwise
//!
//! # Design Decisions
//! - Availability is asked through [`PortProbe`] so resolution is testable
//!   without touching real sockets
//! - Only a networking stack that cannot hand out any port fails resolution

use std::io;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpListener;

/// Port resolution failure.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("port {preferred} is taken and no ephemeral port is available: {source}")]
    Exhausted {
        preferred: u16,
        #[source]
        source: io::Error,
    },
}

/// Answers port availability questions.
#[async_trait]
pub trait PortProbe: Send + Sync {
    /// Whether `port` can be bound right now.
    async fn is_free(&self, port: u16) -> bool;

    /// A port the OS guarantees is free at the time of asking.
    async fn ephemeral(&self) -> io::Result<u16>;
}

/// Probe that test-binds TCP sockets on a host address.
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
    host: IpAddr,
}

impl TcpProbe {
    pub fn new(host: IpAddr) -> Self {
        Self { host }
    }
}

#[async_trait]
impl PortProbe for TcpProbe {
    async fn is_free(&self, port: u16) -> bool {
        TcpListener::bind(SocketAddr::new(self.host, port)).await.is_ok()
    }

    async fn ephemeral(&self) -> io::Result<u16> {
        let listener = TcpListener::bind(SocketAddr::new(self.host, 0)).await?;
        Ok(listener.local_addr()?.port())
    }
}

/// Resolve the port to listen on.
pub async fn resolve_port<P>(preferred: u16, probe: &P) -> Result<u16, PortError>
where
    P: PortProbe + ?Sized,
{
    if probe.is_free(preferred).await {
        return Ok(preferred);
    }

    let fallback = probe
        .ephemeral()
        .await
        .map_err(|source| PortError::Exhausted { preferred, source })?;

    tracing::warn!(preferred, fallback, "Preferred port in use, falling back");
    Ok(fallback)
}
