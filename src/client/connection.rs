use crate::driver::BlockingConnection;
use crate::error::SqlBridgeError;
use crate::executor::{self, WorkerPool};
use crate::pool::Lease;
use crate::results::RowSet;
use crate::statement::{Params, StatementSpec};

/// A connection held for several statements, executed one after another.
///
/// Returned to the pool when dropped. A connection dropped inside a transaction is discarded
/// rather than reused.
#[derive(Debug)]
pub struct SqlConnection {
    lease: Option<Lease>,
    workers: WorkerPool,
    in_transaction: bool,
    needs_rollback: bool,
}

impl SqlConnection {
    pub(crate) fn new(lease: Lease, workers: WorkerPool) -> Self {
        Self {
            lease: Some(lease),
            workers,
            in_transaction: false,
            needs_rollback: false,
        }
    }

    /// Run a statement with parameters.
    ///
    /// # Errors
    /// Validation, encoding, worker, driver or decoding failures.
    pub async fn execute(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<RowSet, SqlBridgeError> {
        let spec = StatementSpec::new(sql, params)?;
        self.run_spec(spec).await
    }

    /// Run a statement without parameters.
    ///
    /// # Errors
    /// See [`SqlConnection::execute`].
    pub async fn query(&mut self, sql: &str) -> Result<RowSet, SqlBridgeError> {
        self.execute(sql, ()).await
    }

    /// Run a multi-statement script.
    ///
    /// # Errors
    /// Worker or driver failures.
    pub async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlBridgeError> {
        self.settle().await?;
        self.run_batch(sql.to_owned()).await
    }

    /// Start a transaction on this connection.
    ///
    /// # Errors
    /// [`SqlBridgeError::StatementError`] if a transaction is already active, or the driver's
    /// failure to begin one.
    pub async fn begin(&mut self) -> Result<Transaction<'_>, SqlBridgeError> {
        self.settle().await?;
        if self.in_transaction {
            return Err(SqlBridgeError::StatementError(
                "a transaction is already active on this connection".into(),
            ));
        }
        self.in_transaction = true;
        if let Err(err) = self
            .run(|conn| conn.begin().map_err(SqlBridgeError::from))
            .await
        {
            self.in_transaction = false;
            return Err(err);
        }
        Ok(Transaction {
            conn: self,
            finished: false,
        })
    }

    #[must_use]
    pub fn connection_id(&self) -> Option<u64> {
        self.lease.as_ref().and_then(Lease::connection_id)
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub(super) async fn run_spec(&mut self, spec: StatementSpec) -> Result<RowSet, SqlBridgeError> {
        self.settle().await?;
        self.run_statement(spec).await
    }

    /// Roll back what an abandoned transaction left open.
    async fn settle(&mut self) -> Result<(), SqlBridgeError> {
        if self.needs_rollback {
            tracing::debug!(conn_id = ?self.connection_id(), "rolling back abandoned transaction");
            self.run(|conn| conn.rollback().map_err(SqlBridgeError::from))
                .await?;
            self.needs_rollback = false;
            self.in_transaction = false;
        }
        Ok(())
    }

    /// Hand the lease to a job. Inside a transaction it travels marked broken, so a request
    /// cancelled mid-flight never returns an open transaction to the pool.
    fn checkout(&mut self) -> Result<Lease, SqlBridgeError> {
        let mut lease = self.lease.take().ok_or(SqlBridgeError::LeaseReleased)?;
        if self.in_transaction {
            lease.set_broken(true);
        }
        Ok(lease)
    }

    fn checkin<T>(&mut self, lease: Option<Lease>, result: &Result<T, SqlBridgeError>) {
        if let Some(mut lease) = lease {
            if self.in_transaction {
                let fatal = matches!(result, Err(err) if err.is_connection_error());
                lease.set_broken(fatal);
            }
            self.lease = Some(lease);
        }
    }

    async fn run<T, F>(&mut self, op: F) -> Result<T, SqlBridgeError>
    where
        F: FnOnce(&mut dyn BlockingConnection) -> Result<T, SqlBridgeError> + Send + 'static,
        T: Send + 'static,
    {
        let lease = self.checkout()?;
        let (lease, result) = executor::dispatch(&self.workers, lease, op).await;
        self.checkin(lease, &result);
        result
    }

    async fn run_statement(&mut self, spec: StatementSpec) -> Result<RowSet, SqlBridgeError> {
        let lease = self.checkout()?;
        let (lease, result) = executor::execute_on(&self.workers, lease, spec).await;
        self.checkin(lease, &result);
        result
    }

    async fn run_batch(&mut self, sql: String) -> Result<(), SqlBridgeError> {
        self.run(move |conn| conn.execute_batch(&sql).map_err(SqlBridgeError::from))
            .await
    }
}

impl Drop for SqlConnection {
    fn drop(&mut self) {
        if self.in_transaction
            && let Some(lease) = self.lease.as_mut()
        {
            tracing::warn!(
                conn_id = ?lease.connection_id(),
                "connection released with an open transaction; discarding it"
            );
            lease.mark_broken();
        }
    }
}

/// A transaction on a [`SqlConnection`].
///
/// Finish it with [`Transaction::commit`] or [`Transaction::rollback`]. Dropping it unfinished
/// schedules a rollback before the connection's next statement.
#[derive(Debug)]
pub struct Transaction<'c> {
    conn: &'c mut SqlConnection,
    finished: bool,
}

impl Transaction<'_> {
    /// # Errors
    /// See [`SqlConnection::execute`].
    pub async fn execute(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<RowSet, SqlBridgeError> {
        let spec = StatementSpec::new(sql, params)?;
        self.conn.run_statement(spec).await
    }

    /// # Errors
    /// Worker or driver failures.
    pub async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlBridgeError> {
        self.conn.run_batch(sql.to_owned()).await
    }

    /// # Errors
    /// The driver's commit failure; the transaction is then rolled back before the next
    /// statement on this connection.
    pub async fn commit(mut self) -> Result<(), SqlBridgeError> {
        self.finish(|conn| conn.commit().map_err(SqlBridgeError::from))
            .await
    }

    /// # Errors
    /// The driver's rollback failure.
    pub async fn rollback(mut self) -> Result<(), SqlBridgeError> {
        self.finish(|conn| conn.rollback().map_err(SqlBridgeError::from))
            .await
    }

    async fn finish<F>(&mut self, op: F) -> Result<(), SqlBridgeError>
    where
        F: FnOnce(&mut dyn BlockingConnection) -> Result<(), SqlBridgeError> + Send + 'static,
    {
        self.finished = true;
        self.conn.needs_rollback = true;
        self.conn.run(op).await?;
        self.conn.needs_rollback = false;
        self.conn.in_transaction = false;
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("transaction dropped without commit or rollback");
            self.conn.needs_rollback = true;
        }
    }
}
