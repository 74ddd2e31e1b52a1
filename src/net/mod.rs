//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Preferred port
//!     → port.rs (probe, fall back to an ephemeral port)
//!     → listener.rs (bind, classify bind errors)
//!     → connection.rs (in-flight tracking for drain)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Port resolution is separate from binding
//! - Each request tracked for graceful shutdown

pub mod connection;
pub mod listener;
pub mod port;

pub use connection::InFlightTracker;
pub use listener::{Listener, ListenerError};
pub use port::{resolve_port, PortError, PortProbe, TcpProbe};
