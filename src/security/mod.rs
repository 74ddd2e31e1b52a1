//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Decoded request:
//!     → sanitize.rs (strip operator keys from body and query)
//!     → headers.rs (harden the response on the way out)
//!     → xss.rs (escape markup in body and query)
//!     → cors.rs (cross-origin policy, answers preflights)
//!     → rate_limit.rs (per-client request quota)
//!     → pollution.rs (collapse repeated parameters)
//!     → Pass to static assets and routing
//! ```
//!
//! # Design Decisions
//! - Each concern is its own stage so the pipeline plan can order them
//! - Rejections are raised as `ApiError` and rendered as structured JSON
//! - No trust in client input

pub mod cors;
pub mod headers;
pub mod pollution;
pub mod rate_limit;
pub mod sanitize;
pub mod xss;

pub use cors::build_cors_layer;
pub use rate_limit::RateLimiter;
