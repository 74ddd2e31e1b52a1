//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Connect store → Assemble pipeline → Resolve port → Bind → Serve
//!
//! Supervision (supervisor.rs, state.rs):
//!     Unbound → Bound → Accepting → Draining → Closed
//!        ↓
//!     FailedToBind
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT or reported fatal error
//!         → first signal wins → drain → exit code
//! ```
//!
//! # Design Decisions
//! - Ordered startup: store first, then pipeline, then listener
//! - Ordered shutdown: stop accept, drain, close store
//! - Shutdown has timeout: close after the drain deadline regardless

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;
pub mod supervisor;

pub use shutdown::{spawn_supervised, FatalReporter, ShutdownSignal, SignalKind};
pub use signals::OsSignals;
pub use startup::{run, StartupError};
pub use state::{ListenerState, TransitionError};
pub use supervisor::LifecycleSupervisor;
