//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     RouteTable (one RouteGroup per name)
//!     → validate names
//!     → nest each group at /api/v1/<name>
//!
//! Request:
//!     /api/v1/<name>/... → owning group
//!     anything else      → 404 from the pipeline fallback
//! ```
//!
//! # Design Decisions
//! - Routes mounted at startup, immutable at runtime
//! - One prefix function for every group, no special cases

pub mod groups;

pub use groups::{
    versioned_prefix, PendingGroup, RouteGroup, RouteTable, RoutingError, API_VERSION, GROUP_NAMES,
};
