//! OS signal handling.
//!
//! # Responsibilities
//! - Register SIGINT and SIGTERM handlers once
//! - Translate each delivery into a [`SignalKind`]
//!
//! # Design Decisions
//! - Streams are kept for the life of the process so a second signal during
//!   drain is still consumed (and ignored by the supervisor) instead of
//!   killing the process with the default disposition

use std::io;

use crate::lifecycle::shutdown::SignalKind;

/// Registered termination signal streams.
pub struct OsSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl OsSignals {
    pub fn register() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind as UnixSignal};
            Ok(Self {
                interrupt: signal(UnixSignal::interrupt())?,
                terminate: signal(UnixSignal::terminate())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next termination request.
    pub async fn recv(&mut self) -> SignalKind {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.interrupt.recv() => SignalKind::Interrupt,
                _ = self.terminate.recv() => SignalKind::Terminate,
            }
        }
        #[cfg(not(unix))]
        {
            match tokio::signal::ctrl_c().await {
                Ok(()) => SignalKind::Interrupt,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                    std::future::pending().await
                }
            }
        }
    }
}
