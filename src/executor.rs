//! Async execution pipeline: acquire, encode, dispatch to a blocking worker, decode, release.

mod worker;

pub use worker::WorkerPool;

use crate::codec;
use crate::driver::{BlockingConnection, DriverStatement};
use crate::error::SqlBridgeError;
use crate::pool::{ConnectionPool, Lease};
use crate::results::RowSet;
use crate::statement::StatementSpec;

/// Run `op` against the leased connection on a blocking worker.
///
/// The lease travels with the job and comes back with its result. A fatal driver error marks the
/// lease broken before it is returned. If the worker pool rejects the job, or the caller stops
/// polling, the lease is dropped (and so released) together with the job; the first case is
/// reported as `(None, Err(..))`.
pub(crate) async fn dispatch<T, F>(
    workers: &WorkerPool,
    mut lease: Lease,
    op: F,
) -> (Option<Lease>, Result<T, SqlBridgeError>)
where
    F: FnOnce(&mut dyn BlockingConnection) -> Result<T, SqlBridgeError> + Send + 'static,
    T: Send + 'static,
{
    let outcome = workers
        .run(move || {
            let result = match lease.connection() {
                Ok(conn) => op(conn),
                Err(err) => Err(err),
            };
            if let Err(SqlBridgeError::Driver(err)) = &result
                && err.is_fatal()
            {
                tracing::warn!(conn_id = ?lease.connection_id(), error = %err, "fatal driver error");
                lease.mark_broken();
            }
            (lease, result)
        })
        .await;

    match outcome {
        Ok((lease, result)) => (Some(lease), result),
        Err(err) => (None, Err(err)),
    }
}

/// Execute one statement on a leased connection. Decoding happens on the worker.
pub(crate) async fn execute_on(
    workers: &WorkerPool,
    lease: Lease,
    spec: StatementSpec,
) -> (Option<Lease>, Result<RowSet, SqlBridgeError>) {
    let binds = match codec::encode_params(spec.params()) {
        Ok(binds) => binds,
        Err(err) => return (Some(lease), Err(err)),
    };
    dispatch(workers, lease, move |conn| {
        let statement = DriverStatement {
            sql: spec.sql(),
            call: spec.call(),
            binds: &binds,
        };
        let raw = conn.execute(&statement)?;
        codec::decode_result(raw, &binds)
    })
    .await
}

/// Acquire a connection, run `spec` on it and release it before returning.
///
/// # Errors
/// Any acquisition, encoding, worker, driver or decoding failure, exactly once.
pub async fn execute(pool: &ConnectionPool, spec: StatementSpec) -> Result<RowSet, SqlBridgeError> {
    let lease = pool.acquire().await?;
    let (lease, result) = execute_on(pool.workers(), lease, spec).await;
    drop(lease);
    result
}

/// Acquire a connection and run a multi-statement script on it.
///
/// # Errors
/// Any acquisition, worker or driver failure.
pub async fn execute_batch(pool: &ConnectionPool, sql: String) -> Result<(), SqlBridgeError> {
    let lease = pool.acquire().await?;
    let (lease, result) = dispatch(pool.workers(), lease, move |conn| {
        conn.execute_batch(&sql).map_err(SqlBridgeError::from)
    })
    .await;
    drop(lease);
    result
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{ConnectOptions, PoolOptions};
    use crate::params;
    use crate::test_utils::{Probe, ScriptedDriver};

    fn pool(max: usize, probe: &Probe) -> ConnectionPool {
        ConnectionPool::new(
            Arc::new(ScriptedDriver::with_probe(probe.clone())),
            ConnectOptions::new("mock:executor"),
            PoolOptions::new(max),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn statement_error_releases_lease_for_reuse() {
        let probe = Probe::default();
        let pool = pool(1, &probe);
        let err = execute(&pool, StatementSpec::new("error here", ()).unwrap())
            .await
            .unwrap_err();
        assert!(!err.is_connection_error());
        assert_eq!(pool.status().idle, 1);

        let rows = execute(&pool, StatementSpec::new("select ?", params![5]).unwrap())
            .await
            .unwrap();
        assert_eq!(rows.first().unwrap().get_int("p1"), Some(5));
        assert_eq!(probe.connects(), 1);
    }

    #[tokio::test]
    async fn fatal_error_discards_connection() {
        let probe = Probe::default();
        let pool = pool(1, &probe);
        let err = execute(&pool, StatementSpec::new("fatal io", ()).unwrap())
            .await
            .unwrap_err();
        assert!(err.is_connection_error());

        execute(&pool, StatementSpec::new("select 1", ()).unwrap())
            .await
            .unwrap();
        assert_eq!(probe.connects(), 2);
        assert_eq!(probe.closes(), 1);
    }

    #[tokio::test]
    async fn panicking_driver_call_discards_connection() {
        let probe = Probe::default();
        let pool = pool(1, &probe);
        let err = execute(&pool, StatementSpec::new("panic now", ()).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SqlBridgeError::ExecutionError(_)));

        execute(&pool, StatementSpec::new("select 1", ()).unwrap())
            .await
            .unwrap();
        assert_eq!(probe.connects(), 2);
    }
}
