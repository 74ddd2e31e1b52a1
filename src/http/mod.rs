//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     → server.rs (axum serve, in-flight tracking, drain)
//!     → pipeline.rs (ordered stages, assembled from a validated plan)
//!         → middleware/ and security/ stages
//!         → route groups under /api/v1/<name>
//!     → error.rs (structured error body)
//!     → Send to client
//! ```

pub mod error;
pub mod middleware;
pub mod params;
pub mod pipeline;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use pipeline::{assemble, AssembledPipeline, PipelinePlan, Stage};
pub use server::AppState;
