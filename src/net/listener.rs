//! TCP listener binding.
//!
//! # Responsibilities
//! - Bind the resolved port on the configured host
//! - Classify bind failures as port-in-use or generic
//!
//! # Design Decisions
//! - No retry on another port: the port was already resolved

use std::io;
use std::net::{IpAddr, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The port is already bound by someone else.
    #[error("port {port} is already in use")]
    AddrInUse {
        port: u16,
        #[source]
        source: io::Error,
    },
    /// Any other bind failure.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

impl ListenerError {
    fn classify(addr: SocketAddr, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::AddrInUse {
            ListenerError::AddrInUse {
                port: addr.port(),
                source,
            }
        } else {
            ListenerError::Bind { addr, source }
        }
    }
}

/// A bound TCP listener, not yet accepting.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind `host:port`.
    pub async fn bind(host: IpAddr, port: u16) -> Result<Self, ListenerError> {
        let addr = SocketAddr::new(host, port);

        let inner = TcpListener::bind(addr)
            .await
            .map_err(|e| ListenerError::classify(addr, e))?;
        let local_addr = inner
            .local_addr()
            .map_err(|e| ListenerError::classify(addr, e))?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self { inner, local_addr })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn into_inner(self) -> TcpListener {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = Listener::bind(LOCALHOST, 0).await.unwrap();
        assert_ne!(listener.port(), 0);
        assert_eq!(listener.local_addr().ip(), LOCALHOST);
    }

    #[tokio::test]
    async fn second_bind_reports_addr_in_use() {
        let first = Listener::bind(LOCALHOST, 0).await.unwrap();

        let err = Listener::bind(LOCALHOST, first.port()).await.unwrap_err();
        assert!(matches!(err, ListenerError::AddrInUse { .. }));
        assert!(err.to_string().contains(&first.port().to_string()));
    }
}
