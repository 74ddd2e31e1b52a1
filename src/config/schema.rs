//! Configuration schema definitions.
//!
//! Two sources feed the process configuration:
//! - the process environment, for the recognized keys (`RUN_MODE`, `PORT`,
//!   `DATA_STORE_URI`, `AUTH_SECRET`)
//! - an optional TOML tunables file, for everything with a sensible default
//!
//! Tunables derive Serde traits so the file may be partial or absent.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Port used when `PORT` is unset or not a number.
pub const FALLBACK_PORT: u16 = 5000;

/// Operating mode of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Verbose request logging, human-readable log output.
    #[default]
    Development,
    /// No per-request logging, JSON log output.
    Production,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Development => "development",
            RunMode::Production => "production",
        }
    }

    /// Whether the verbose request/response logging stage is active.
    pub fn verbose_logging(&self) -> bool {
        matches!(self, RunMode::Development)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(RunMode::Development),
            "production" => Ok(RunMode::Production),
            other => Err(format!("expected `development` or `production`, got `{other}`")),
        }
    }
}

/// Fully resolved, immutable process configuration.
///
/// Built once at startup by [`crate::config::loader`] and shared behind an
/// `Arc` by every component that needs it.
#[derive(Clone)]
pub struct ProcessConfig {
    /// Operating mode.
    pub run_mode: RunMode,

    /// Port to try first. Falls back to [`FALLBACK_PORT`] when unset.
    pub preferred_port: u16,

    /// Connection target for the backing data store.
    pub data_store_uri: String,

    /// Token-signing key handed to the auth route group.
    pub auth_secret: String,

    /// Tunables from the optional config file.
    pub server: ServerConfig,
}

impl fmt::Debug for ProcessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessConfig")
            .field("run_mode", &self.run_mode)
            .field("preferred_port", &self.preferred_port)
            .field("data_store_uri", &"<redacted>")
            .field("auth_secret", &"<redacted>")
            .field("server", &self.server)
            .finish()
    }
}

/// Root of the tunables file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener and shutdown settings.
    pub listener: ListenerConfig,

    /// Request pipeline settings.
    pub http: HttpConfig,

    /// Rate limiting settings.
    pub rate_limit: RateLimitConfig,

    /// Data store pool settings.
    pub database: DatabaseConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub host: IpAddr,

    /// Maximum time in seconds to wait for in-flight requests while draining.
    pub drain_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            drain_timeout_secs: 30,
        }
    }
}

/// Request pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Maximum size in bytes of a JSON or form body.
    pub body_limit_bytes: usize,

    /// Maximum size in bytes of a multipart upload.
    pub upload_limit_bytes: usize,

    /// Route dispatch timeout in seconds.
    pub request_timeout_secs: u64,

    /// Directory served at the root path.
    pub static_dir: PathBuf,

    /// Directory where uploaded files are staged.
    pub upload_dir: PathBuf,

    /// Allowed CORS origins. `"*"` allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            body_limit_bytes: 100 * 1024,
            upload_limit_bytes: 50 * 1024 * 1024,
            request_timeout_secs: 30,
            static_dir: PathBuf::from("public"),
            upload_dir: PathBuf::from("uploads"),
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window length in seconds.
    pub window_secs: u64,

    /// Requests allowed per client within one window.
    pub max_requests: u32,

    /// How often expired windows are evicted, in seconds.
    pub purge_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 10 * 60,
            max_requests: 100,
            purge_interval_secs: 60,
        }
    }
}

/// Data store connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Maximum pooled connections.
    pub max_connections: u32,

    /// Time allowed for the initial connection, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connect_timeout_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Prometheus exporter bind address. Disabled when unset.
    pub metrics_address: Option<String>,
}
