//! Data store subsystem.
//!
//! # Data Flow
//! ```text
//! ProcessConfig.data_store_uri
//!     → DataStoreConnector::connect (one shot, at startup)
//!     → DataStoreHandle (shared via Arc with every route group)
//!     → DataStoreHandle::close (only during graceful drain)
//! ```
//!
//! # Design Decisions
//! - Exactly one handle per process, created before the listener opens
//! - Connection failure is fatal; never retried
//! - The connector is a trait so startup can be exercised without a database

pub mod postgres;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

pub use postgres::PgConnector;

/// Error type for data store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The URI could not be parsed or names an unsupported scheme.
    #[error("malformed data store URI: {0}")]
    MalformedUri(String),

    /// The store could not be reached or refused the credentials.
    #[error("data store unreachable: {0}")]
    Connect(#[source] sqlx::Error),

    /// The store accepted the connection but failed the probe query.
    #[error("data store probe failed: {0}")]
    Probe(#[source] sqlx::Error),
}

/// The single, process-wide handle to the backing store.
#[derive(Debug)]
pub struct DataStoreHandle {
    pool: PgPool,
    host: String,
}

impl DataStoreHandle {
    pub(crate) fn new(pool: PgPool, host: String) -> Self {
        Self { pool, host }
    }

    /// Host the handle is connected to, for logging.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Connection pool for route groups to query through.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close every pooled connection. Called once, during graceful drain.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!(host = %self.host, "Data store connection closed");
    }
}

/// Establishes the process-wide data store handle.
#[async_trait]
pub trait DataStoreConnector: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<DataStoreHandle, StoreError>;
}
