use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::Shared;
use crate::driver::BlockingConnection;
use crate::error::SqlBridgeError;

/// A physical connection owned by the pool.
pub struct PooledConnection {
    pub(super) id: u64,
    pub(super) conn: Box<dyn BlockingConnection>,
    pub(super) in_use: bool,
    pub(super) created_at: Instant,
    pub(super) last_used_at: Instant,
}

impl PooledConnection {
    pub(super) fn new(id: u64, conn: Box<dyn BlockingConnection>) -> Self {
        let now = Instant::now();
        Self {
            id,
            conn,
            in_use: false,
            created_at: now,
            last_used_at: now,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    #[must_use]
    pub fn idle_for(&self) -> std::time::Duration {
        self.last_used_at.elapsed()
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("in_use", &self.in_use)
            .field("age", &self.age())
            .finish_non_exhaustive()
    }
}

/// Exclusive right to use one pooled connection.
///
/// Dropping the lease returns the connection to the pool (or to the next waiter). A lease
/// dropped while its thread is panicking, or marked with [`Lease::mark_broken`], is discarded
/// instead.
pub struct Lease {
    conn: Option<PooledConnection>,
    shared: Arc<Shared>,
    broken: bool,
}

impl Lease {
    pub(super) fn new(mut conn: PooledConnection, shared: Arc<Shared>) -> Self {
        conn.in_use = true;
        tracing::debug!(conn_id = conn.id, "lease granted");
        Self {
            conn: Some(conn),
            shared,
            broken: false,
        }
    }

    /// The leased physical connection.
    ///
    /// # Errors
    /// [`SqlBridgeError::LeaseReleased`] once the lease has been released.
    pub fn connection(&mut self) -> Result<&mut dyn BlockingConnection, SqlBridgeError> {
        match self.conn.as_mut() {
            Some(pooled) => Ok(&mut *pooled.conn),
            None => Err(SqlBridgeError::LeaseReleased),
        }
    }

    /// Id of the leased connection, `None` after release.
    #[must_use]
    pub fn connection_id(&self) -> Option<u64> {
        self.conn.as_ref().map(|c| c.id)
    }

    /// Discard the connection on release instead of reusing it.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub(crate) fn set_broken(&mut self, broken: bool) {
        self.broken = broken;
    }

    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.conn.is_none()
    }

    /// Give the connection back now.
    ///
    /// # Errors
    /// [`SqlBridgeError::LeaseReleased`] if this lease was already released; the pool is not
    /// touched in that case.
    pub fn release(&mut self) -> Result<(), SqlBridgeError> {
        let Some(conn) = self.conn.take() else {
            tracing::warn!("lease released twice");
            return Err(SqlBridgeError::LeaseReleased);
        };
        self.shared.release(conn, self.broken);
        Ok(())
    }

    /// Take the connection out without releasing it. Only the pool does this, while it holds its
    /// own lock and re-routes the connection itself.
    pub(super) fn disarm(mut self) -> Option<PooledConnection> {
        self.conn.take()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let broken = self.broken || std::thread::panicking();
            self.shared.release(conn, broken);
        }
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("conn", &self.conn)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

/// A counted connection slot that is not yet backed by a connection.
///
/// Dropping an uncommitted reservation gives the slot back.
pub(super) struct Reservation {
    shared: Option<Arc<Shared>>,
}

impl Reservation {
    pub(super) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared: Some(shared),
        }
    }

    /// The slot is now owned by a live connection.
    pub(super) fn commit(mut self) {
        self.shared = None;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.slot_freed();
        }
    }
}
