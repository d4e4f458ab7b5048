//! Client-facing API: a pool handle plus query builders.
//!
//! ```rust,no_run
//! use sql_bridge::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlBridgeError> {
//! let registry = DriverRegistry::with_defaults();
//! let pool = Pool::new(
//!     &registry,
//!     ConnectOptions::new("sqlite:file:demo?mode=memory&cache=shared"),
//!     PoolOptions::new(4),
//! )?;
//!
//! pool.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)").await?;
//! pool.prepared_query("INSERT INTO t (name) VALUES (?)")
//!     .execute(params!["alice"])
//!     .await?;
//! let rows = pool.query("SELECT id, name FROM t").execute().await?;
//! assert_eq!(rows.first().and_then(|r| r.get_text("name")), Some("alice"));
//! pool.close().await;
//! # Ok(()) }
//! ```

mod connection;

use std::sync::Arc;

pub use connection::{SqlConnection, Transaction};

use crate::config::{ConnectOptions, PoolOptions};
use crate::driver::{Driver, DriverRegistry};
use crate::error::SqlBridgeError;
use crate::executor;
use crate::pool::{ConnectionPool, PoolStatus};
use crate::results::RowSet;
use crate::statement::{Params, StatementSpec};

/// Handle to a connection pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Pool {
    inner: ConnectionPool,
}

impl Pool {
    /// Create a pool for `connect.url`, using the driver registered for its scheme.
    ///
    /// No connection is opened here.
    ///
    /// # Errors
    /// [`SqlBridgeError::ConfigError`] for invalid options or an unknown scheme.
    pub fn new(
        registry: &DriverRegistry,
        connect: ConnectOptions,
        options: PoolOptions,
    ) -> Result<Self, SqlBridgeError> {
        connect.validate()?;
        let driver = registry.resolve(&connect)?;
        Self::with_driver(driver, connect, options)
    }

    /// Create a pool around an explicit driver, bypassing the registry.
    ///
    /// # Errors
    /// [`SqlBridgeError::ConfigError`] for invalid options.
    pub fn with_driver(
        driver: Arc<dyn Driver>,
        connect: ConnectOptions,
        options: PoolOptions,
    ) -> Result<Self, SqlBridgeError> {
        Ok(Self {
            inner: ConnectionPool::new(driver, connect, options)?,
        })
    }

    /// A statement without parameters.
    #[must_use]
    pub fn query(&self, sql: impl Into<String>) -> Query<'_> {
        Query {
            pool: self,
            sql: sql.into(),
        }
    }

    /// A statement executed with parameters, possibly several times.
    #[must_use]
    pub fn prepared_query(&self, sql: impl Into<String>) -> PreparedQuery<'_> {
        PreparedQuery {
            pool: self,
            sql: sql.into(),
        }
    }

    /// Run a multi-statement script on one pooled connection.
    ///
    /// # Errors
    /// Acquisition, worker or driver failures.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), SqlBridgeError> {
        executor::execute_batch(&self.inner, sql.to_owned()).await
    }

    /// Hold one connection for a sequence of statements or a transaction.
    ///
    /// # Errors
    /// Acquisition failures.
    pub async fn get_connection(&self) -> Result<SqlConnection, SqlBridgeError> {
        let lease = self.inner.acquire().await?;
        Ok(SqlConnection::new(lease, self.inner.workers().clone()))
    }

    /// See [`ConnectionPool::close`].
    pub async fn close(&self) {
        self.inner.close().await;
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.inner.status()
    }

    #[must_use]
    pub fn connection_pool(&self) -> &ConnectionPool {
        &self.inner
    }
}

/// Builder returned by [`Pool::query`].
#[derive(Debug)]
pub struct Query<'p> {
    pool: &'p Pool,
    sql: String,
}

impl Query<'_> {
    /// # Errors
    /// Validation, acquisition, worker, driver or decoding failures.
    pub async fn execute(self) -> Result<RowSet, SqlBridgeError> {
        let spec = StatementSpec::new(self.sql, Params::new())?;
        executor::execute(&self.pool.inner, spec).await
    }
}

/// Builder returned by [`Pool::prepared_query`].
#[derive(Debug)]
pub struct PreparedQuery<'p> {
    pool: &'p Pool,
    sql: String,
}

impl PreparedQuery<'_> {
    /// Execute once with `params`, which may include OUT/INOUT parameters for `{call ...}`.
    ///
    /// # Errors
    /// Validation, acquisition, encoding, worker, driver or decoding failures.
    pub async fn execute(&self, params: impl Into<Params>) -> Result<RowSet, SqlBridgeError> {
        let spec = StatementSpec::new(self.sql.as_str(), params)?;
        executor::execute(&self.pool.inner, spec).await
    }

    /// Execute once per parameter set on a single connection and return the summed affected-row
    /// count. Every set is validated before the connection is acquired; execution stops at the
    /// first failure.
    ///
    /// # Errors
    /// As for [`PreparedQuery::execute`].
    pub async fn execute_batch<I, P>(&self, batch: I) -> Result<u64, SqlBridgeError>
    where
        I: IntoIterator<Item = P>,
        P: Into<Params>,
    {
        let specs = batch
            .into_iter()
            .map(|params| StatementSpec::new(self.sql.as_str(), params))
            .collect::<Result<Vec<_>, _>>()?;
        if specs.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.get_connection().await?;
        let mut total: u64 = 0;
        for spec in specs {
            let rows = conn.run_spec(spec).await?;
            total = total.saturating_add(rows.rows_affected());
        }
        Ok(total)
    }
}
