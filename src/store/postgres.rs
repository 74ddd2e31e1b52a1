//! PostgreSQL connector.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use url::Url;

use crate::config::DatabaseConfig;
use crate::store::{DataStoreConnector, DataStoreHandle, StoreError};

const SUPPORTED_SCHEMES: [&str; 2] = ["postgres", "postgresql"];

/// Connects to PostgreSQL through an `sqlx` pool.
///
/// The relational store rejects statements referencing undeclared columns,
/// so no schema-less write can slip through a handle produced here.
#[derive(Debug, Clone)]
pub struct PgConnector {
    config: DatabaseConfig,
}

impl PgConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(Duration::from_secs(self.config.connect_timeout_secs))
    }

    /// Build a handle without dialing the store.
    ///
    /// Connections are opened on first use. Startup never uses this; it exists
    /// for harnesses that need a handle but no database.
    pub fn connect_lazy(&self, uri: &str) -> Result<DataStoreHandle, StoreError> {
        let host = target_host(uri)?;
        let pool = self.pool_options().connect_lazy(uri).map_err(StoreError::Connect)?;
        Ok(DataStoreHandle::new(pool, host))
    }
}

#[async_trait]
impl DataStoreConnector for PgConnector {
    async fn connect(&self, uri: &str) -> Result<DataStoreHandle, StoreError> {
        let host = target_host(uri)?;

        tracing::debug!(host = %host, "Connecting to data store");

        let pool: PgPool = self
            .pool_options()
            .connect(uri)
            .await
            .map_err(StoreError::Connect)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(StoreError::Probe)?;

        Ok(DataStoreHandle::new(pool, host))
    }
}

/// Extract the host from a connection URI, rejecting unsupported schemes.
///
/// Error messages never echo the URI itself, which may carry credentials.
pub fn target_host(uri: &str) -> Result<String, StoreError> {
    let url = Url::parse(uri).map_err(|e| StoreError::MalformedUri(e.to_string()))?;

    if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
        return Err(StoreError::MalformedUri(format!(
            "unsupported scheme `{}`",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(host.to_string()),
        _ => Err(StoreError::MalformedUri("missing host".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_host() {
        assert_eq!(
            target_host("postgres://app:pw@db.internal:5432/vidshare").unwrap(),
            "db.internal"
        );
        assert_eq!(target_host("postgresql://localhost/app").unwrap(), "localhost");
    }

    #[test]
    fn rejects_other_schemes() {
        let err = target_host("mongodb://localhost/app").unwrap_err();
        assert!(matches!(err, StoreError::MalformedUri(msg) if msg.contains("mongodb")));
    }

    #[test]
    fn malformed_uri_does_not_leak_credentials() {
        let err = target_host("not a uri with secret-password").unwrap_err();
        assert!(!err.to_string().contains("secret-password"));
    }

    #[tokio::test]
    async fn connect_rejects_malformed_uri_before_dialing() {
        let connector = PgConnector::new(DatabaseConfig::default());
        let err = connector.connect("::::").await.unwrap_err();
        assert!(matches!(err, StoreError::MalformedUri(_)));
    }

    #[tokio::test]
    async fn lazy_handle_reports_host() {
        let connector = PgConnector::new(DatabaseConfig::default());
        let handle = connector
            .connect_lazy("postgres://app@db.example:5432/app")
            .unwrap();
        assert_eq!(handle.host(), "db.example");
        handle.close().await;
    }
}
