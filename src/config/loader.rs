//! Configuration loading from the environment and disk.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{ProcessConfig, RunMode, ServerConfig, FALLBACK_PORT};
use crate::config::validation::{validate_config, ValidationError};

pub const RUN_MODE: &str = "RUN_MODE";
pub const PORT: &str = "PORT";
pub const DATA_STORE_URI: &str = "DATA_STORE_URI";
pub const AUTH_SECRET: &str = "AUTH_SECRET";

/// Keys that must be present and non-empty before anything else starts.
pub const REQUIRED_KEYS: [&str; 2] = [DATA_STORE_URI, AUTH_SECRET];

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to load env file {}: {source}", path.display())]
    EnvFile { path: PathBuf, source: dotenvy::Error },

    #[error("failed to parse {}: {source}", path.display())]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a `.env` file into the process environment.
///
/// Variables already set in the environment win. A missing file is not an
/// error; returns whether a file was applied.
pub fn load_env_file(path: &Path) -> Result<bool, ConfigError> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(source) => Err(ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Load and validate the tunables file. A missing file yields the defaults.
pub fn load_server_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(ServerConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let config: ServerConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build the process configuration from a key lookup and the tunables.
///
/// Required keys are checked first so a missing key is always the reported
/// failure, regardless of what else is wrong.
pub fn from_lookup<F>(lookup: F, server: ServerConfig) -> Result<ProcessConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let missing: Vec<&'static str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| value(*key).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::Missing(missing));
    }

    let run_mode = match value(RUN_MODE) {
        Some(raw) => raw
            .parse::<RunMode>()
            .map_err(|reason| ConfigError::Invalid { key: RUN_MODE, reason })?,
        None => RunMode::default(),
    };

    let preferred_port = match value(PORT) {
        Some(raw) => raw.trim().parse::<u16>().unwrap_or_else(|_| {
            tracing::warn!(value = %raw, fallback = FALLBACK_PORT, "PORT is not a valid port number, using fallback");
            FALLBACK_PORT
        }),
        None => FALLBACK_PORT,
    };

    Ok(ProcessConfig {
        run_mode,
        preferred_port,
        data_store_uri: value(DATA_STORE_URI).unwrap_or_default(),
        auth_secret: value(AUTH_SECRET).unwrap_or_default(),
        server,
    })
}

/// Load the process configuration from the environment and the tunables file.
pub fn load(config_path: &Path) -> Result<ProcessConfig, ConfigError> {
    let lookup = |key: &str| env::var(key).ok();

    // Fail on a missing key before touching the file system.
    from_lookup(lookup, ServerConfig::default())?;

    let server = load_server_config(config_path)?;
    from_lookup(lookup, server)
}

/// Best-effort run mode for logger setup, before the configuration is validated.
pub fn detect_run_mode() -> RunMode {
    env::var(RUN_MODE)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default()
}
