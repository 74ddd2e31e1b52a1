//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config/.env (optional)
//!     → loader.rs (dotenv into process environment)
//! process environment
//!     → loader.rs (required keys present and non-empty, else fatal)
//! config/server.toml (optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProcessConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All tunables have defaults to allow minimal configs
//! - Missing required keys are reported by name, before any other check

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, ConfigError};
pub use schema::{
    DatabaseConfig, HttpConfig, ListenerConfig, ProcessConfig, RateLimitConfig, RunMode,
    ServerConfig, FALLBACK_PORT,
};
