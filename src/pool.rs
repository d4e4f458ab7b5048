//! Bounded pool of blocking connections with async, FIFO acquisition.
//!
//! All bookkeeping lives behind one `std` mutex that is never held across an `.await` or a
//! blocking driver call. Connecting and closing happen on blocking threads; a connection slot
//! stays counted until its physical close has finished, so the number of open connections never
//! exceeds `max_size`.

mod lease;
mod waiters;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::config::{ConnectOptions, PoolOptions};
use crate::driver::Driver;
use crate::error::SqlBridgeError;
use crate::executor::WorkerPool;

pub use lease::{Lease, PooledConnection};
use lease::Reservation;
use waiters::{Grant, PendingLease, WaitQueue};

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_size: usize,
    /// Physical connections open or being opened.
    pub size: usize,
    pub idle: usize,
    /// Acquire requests queued for a connection.
    pub waiting: usize,
    pub closed: bool,
}

#[derive(Default)]
struct PoolState {
    idle: VecDeque<PooledConnection>,
    /// Open plus opening plus closing connections.
    live: usize,
    waiters: WaitQueue,
    closed: bool,
}

impl PoolState {
    fn take_expired(&mut self, idle_timeout: Option<Duration>) -> Vec<PooledConnection> {
        let Some(ttl) = idle_timeout else {
            return Vec::new();
        };
        let mut expired = Vec::new();
        let mut idx = 0;
        while idx < self.idle.len() {
            if self.idle[idx].idle_for() > ttl {
                if let Some(conn) = self.idle.remove(idx) {
                    expired.push(conn);
                }
            } else {
                idx += 1;
            }
        }
        expired
    }
}

pub(crate) struct Shared {
    driver: Arc<dyn Driver>,
    connect: ConnectOptions,
    options: PoolOptions,
    workers: WorkerPool,
    state: Mutex<PoolState>,
    next_conn_id: AtomicU64,
    /// Runtime the pool was created on, used when a lease is released on a non-runtime thread.
    runtime: Option<Handle>,
}

impl Shared {
    fn runtime(&self) -> Option<Handle> {
        Handle::try_current().ok().or_else(|| self.runtime.clone())
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Open a physical connection. Blocks.
    fn connect_blocking(&self) -> Result<PooledConnection, SqlBridgeError> {
        let conn = self.driver.connect(&self.connect).map_err(|err| {
            tracing::warn!(error = %err, "failed to open connection");
            SqlBridgeError::ConnectionError(err.to_string())
        })?;
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(conn_id = id, "opened connection");
        Ok(PooledConnection::new(id, conn))
    }

    /// Turn a freshly opened connection into a lease, unless the pool closed meanwhile.
    fn adopt(self: &Arc<Self>, conn: PooledConnection) -> Result<Lease, SqlBridgeError> {
        if self.lock().closed {
            self.retire(conn);
            return Err(SqlBridgeError::PoolClosed);
        }
        Ok(Lease::new(conn, Arc::clone(self)))
    }

    pub(super) fn release(self: &Arc<Self>, mut conn: PooledConnection, broken: bool) {
        conn.last_used_at = Instant::now();
        let mut state = self.lock();
        if broken || state.closed {
            drop(state);
            if broken {
                tracing::warn!(conn_id = conn.id, "discarding broken connection");
            }
            self.retire(conn);
            return;
        }
        self.hand_off(&mut state, conn);
    }

    /// Give `conn` to the oldest live waiter, or park it as idle.
    fn hand_off(self: &Arc<Self>, state: &mut PoolState, mut conn: PooledConnection) {
        loop {
            let Some(waiter) = state.waiters.pop_front() else {
                conn.in_use = false;
                tracing::debug!(conn_id = conn.id, "connection returned to idle set");
                state.idle.push_back(conn);
                return;
            };
            match waiter.send(Ok(Lease::new(conn, Arc::clone(self)))) {
                Ok(()) => return,
                // The waiter went away between enqueue and grant; try the next one.
                Err(Ok(lease)) => match lease.disarm() {
                    Some(returned) => conn = returned,
                    None => return,
                },
                Err(Err(_)) => return,
            }
        }
    }

    /// Close `conn` on a blocking thread, then free its slot.
    fn retire(self: &Arc<Self>, conn: PooledConnection) {
        let shared = Arc::clone(self);
        let job = move || {
            shared.close_blocking(conn);
            shared.slot_freed();
        };
        match self.runtime() {
            Some(handle) => {
                handle.spawn_blocking(job);
            }
            None => job(),
        }
    }

    fn close_blocking(&self, conn: PooledConnection) {
        let id = conn.id;
        match conn.conn.close() {
            Ok(()) => tracing::debug!(conn_id = id, "closed connection"),
            Err(err) => tracing::warn!(conn_id = id, error = %err, "failed to close connection"),
        }
    }

    /// A slot was given back. Reuse it for queued requests if there are any.
    ///
    /// Without a runtime to open a replacement on, the head waiter fails instead.
    fn slot_freed(self: &Arc<Self>) {
        let runtime = self.runtime();
        let replace = {
            let mut state = self.lock();
            state.live = state.live.saturating_sub(1);
            if !state.closed && !state.waiters.is_empty() && state.live < self.options.max_size {
                if runtime.is_some() {
                    state.live += 1;
                }
                true
            } else {
                false
            }
        };
        match (replace, runtime) {
            (true, Some(handle)) => self.spawn_replacement(&handle),
            (true, None) => {
                tracing::warn!("no runtime available to open a replacement connection");
                self.fail_head_waiter(SqlBridgeError::ConnectionError(
                    "no async runtime available to open a replacement connection".into(),
                ));
            }
            (false, _) => {}
        }
    }

    /// Open a connection for the head of the queue on an already reserved slot.
    ///
    /// If opening fails, exactly the head waiter receives the error; the slot is then released,
    /// which starts another attempt if requests remain queued.
    fn spawn_replacement(self: &Arc<Self>, handle: &Handle) {
        let reservation = Reservation::new(Arc::clone(self));
        let shared = Arc::clone(self);
        handle.spawn(async move {
            let worker_shared = Arc::clone(&shared);
            let outcome = shared
                .workers
                .run(move || match worker_shared.connect_blocking() {
                    Ok(conn) => {
                        reservation.commit();
                        // Dropping the lease hands the connection to the head waiter.
                        drop(worker_shared.adopt(conn));
                    }
                    Err(err) => {
                        worker_shared.fail_head_waiter(err);
                        drop(reservation);
                    }
                })
                .await;
            if let Err(err) = outcome {
                tracing::debug!(error = %err, "replacement connection not opened");
            }
        });
    }

    fn fail_head_waiter(&self, err: SqlBridgeError) {
        let mut state = self.lock();
        let mut err = err;
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(Err(err)) {
                Ok(()) => return,
                Err(Err(returned)) => err = returned,
                Err(Ok(_)) => return,
            }
        }
    }
}

/// Connection pool handle. Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<Shared>,
}

impl ConnectionPool {
    /// Create an empty pool. Connections are opened lazily by [`ConnectionPool::acquire`].
    ///
    /// # Errors
    /// [`SqlBridgeError::ConfigError`] for invalid options.
    pub fn new(
        driver: Arc<dyn Driver>,
        connect: ConnectOptions,
        options: PoolOptions,
    ) -> Result<Self, SqlBridgeError> {
        connect.validate()?;
        options.validate()?;
        let workers = WorkerPool::new(options.effective_worker_pool_size());
        tracing::info!(
            scheme = driver.scheme(),
            max_size = options.max_size,
            workers = workers.size(),
            "connection pool created"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                driver,
                connect,
                options,
                workers,
                state: Mutex::new(PoolState::default()),
                next_conn_id: AtomicU64::new(1),
                runtime: Handle::try_current().ok(),
            }),
        })
    }

    /// Obtain a lease, waiting in FIFO order when all connections are in use.
    ///
    /// # Errors
    /// - [`SqlBridgeError::PoolClosed`] if the pool is (or gets) closed
    /// - [`SqlBridgeError::PoolExhausted`] if the wait queue is full
    /// - [`SqlBridgeError::PoolTimeout`] if `connection_timeout` elapses first
    /// - [`SqlBridgeError::ConnectionError`] if a needed connection cannot be opened
    pub async fn acquire(&self) -> Result<Lease, SqlBridgeError> {
        enum Step {
            Ready(PooledConnection),
            Open,
            Wait(PendingLease),
        }

        let shared = &self.shared;
        let (step, expired) = {
            let mut state = shared.lock();
            if state.closed {
                return Err(SqlBridgeError::PoolClosed);
            }
            let expired = state.take_expired(shared.options.idle_timeout);
            let step = if state.waiters.is_empty()
                && let Some(conn) = state.idle.pop_back()
            {
                Step::Ready(conn)
            } else if state.live < shared.options.max_size {
                state.live += 1;
                Step::Open
            } else {
                if let Some(limit) = shared.options.max_wait_queue_size
                    && state.waiters.len() >= limit
                {
                    drop(state);
                    for conn in expired {
                        shared.retire(conn);
                    }
                    return Err(SqlBridgeError::PoolExhausted(limit));
                }
                let (tx, rx) = oneshot::channel();
                let id = state.waiters.push(tx);
                Step::Wait(PendingLease::new(id, rx, Arc::clone(shared)))
            };
            (step, expired)
        };

        for conn in expired {
            tracing::debug!(conn_id = conn.id, "evicting idle connection");
            shared.retire(conn);
        }

        match step {
            Step::Ready(conn) => Ok(Lease::new(conn, Arc::clone(shared))),
            Step::Open => self.open().await,
            Step::Wait(pending) => self.wait(pending).await,
        }
    }

    async fn open(&self) -> Result<Lease, SqlBridgeError> {
        let reservation = Reservation::new(Arc::clone(&self.shared));
        let shared = Arc::clone(&self.shared);
        let opened = self
            .shared
            .workers
            .run(move || {
                let conn = shared.connect_blocking()?;
                reservation.commit();
                shared.adopt(conn)
            })
            .await;
        match opened {
            Ok(grant) => grant,
            Err(SqlBridgeError::WorkerRejected(_)) if self.shared.lock().closed => {
                Err(SqlBridgeError::PoolClosed)
            }
            Err(err) => Err(err),
        }
    }

    async fn wait(&self, mut pending: PendingLease) -> Grant {
        match self.shared.options.connection_timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, pending.recv()).await;
                match waited {
                    Ok(grant) => grant,
                    Err(_) => pending.expire(limit),
                }
            }
            None => pending.recv().await,
        }
    }

    /// Close the pool.
    ///
    /// Queued requests fail with [`SqlBridgeError::PoolClosed`], idle connections are closed
    /// (and awaited), and the worker pool stops accepting jobs. Connections currently leased are
    /// closed when their lease is released. Calling `close` again is a no-op.
    pub async fn close(&self) {
        let (idle, waiters) = {
            let mut state = self.shared.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let idle: Vec<PooledConnection> = state.idle.drain(..).collect();
            (idle, state.waiters.drain())
        };

        tracing::info!(
            idle = idle.len(),
            waiting = waiters.len(),
            "closing connection pool"
        );
        for waiter in waiters {
            let _ = waiter.send(Err(SqlBridgeError::PoolClosed));
        }

        let closes = idle.into_iter().map(|conn| {
            let shared = Arc::clone(&self.shared);
            tokio::task::spawn_blocking(move || {
                shared.close_blocking(conn);
                shared.slot_freed();
            })
        });
        for joined in futures_util::future::join_all(closes).await {
            if let Err(err) = joined {
                tracing::warn!(error = %err, "connection close task failed");
            }
        }

        self.shared.workers.shutdown();
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.shared.lock();
        PoolStatus {
            max_size: self.shared.options.max_size,
            size: state.live,
            idle: state.idle.len(),
            waiting: state.waiters.len(),
            closed: state.closed,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Worker pool that runs this pool's blocking calls.
    #[must_use]
    pub fn workers(&self) -> &WorkerPool {
        &self.shared.workers
    }

    #[must_use]
    pub fn options(&self) -> &PoolOptions {
        &self.shared.options
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("driver", &self.shared.driver.scheme())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Probe, ScriptedDriver};

    fn pool(max: usize, probe: &Probe) -> ConnectionPool {
        ConnectionPool::new(
            Arc::new(ScriptedDriver::with_probe(probe.clone())),
            ConnectOptions::new("mock:pool"),
            PoolOptions::new(max),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn idle_connection_is_reused() {
        let probe = Probe::default();
        let pool = pool(2, &probe);

        let first = pool.acquire().await.unwrap();
        let id = first.connection_id();
        drop(first);
        let second = pool.acquire().await.unwrap();
        assert_eq!(second.connection_id(), id);
        assert_eq!(probe.connects(), 1);
        assert_eq!(pool.status().size, 1);
    }

    #[tokio::test]
    async fn release_goes_to_head_waiter() {
        let probe = Probe::default();
        let pool = pool(1, &probe);
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|l| l.connection_id()) })
        };
        while pool.status().waiting == 0 {
            tokio::task::yield_now().await;
        }
        let id = held.connection_id();
        drop(held);
        assert_eq!(waiter.await.unwrap().unwrap(), id);
        assert_eq!(probe.connects(), 1);
    }

    #[tokio::test]
    async fn double_release_is_an_error() {
        let probe = Probe::default();
        let pool = pool(1, &probe);
        let mut lease = pool.acquire().await.unwrap();
        lease.release().unwrap();
        assert!(matches!(lease.release(), Err(SqlBridgeError::LeaseReleased)));
        assert!(matches!(lease.connection(), Err(SqlBridgeError::LeaseReleased)));
        assert_eq!(pool.status().idle, 1);
    }

    #[tokio::test]
    async fn broken_connection_keeps_slot_until_closed() {
        let probe = Probe::default();
        let pool = pool(1, &probe);
        let mut lease = pool.acquire().await.unwrap();
        lease.mark_broken();
        drop(lease);

        let replacement = pool.acquire().await.unwrap();
        assert_eq!(probe.closes(), 1);
        assert_eq!(probe.connects(), 2);
        assert!(probe.max_open() <= 1);
        drop(replacement);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn broken_lease_dropped_off_runtime_serves_waiter() {
        let probe = Probe::default();
        let pool = pool(1, &probe);
        let mut lease = pool.acquire().await.unwrap();
        lease.mark_broken();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|l| l.connection_id()) })
        };
        while pool.status().waiting == 0 {
            tokio::task::yield_now().await;
        }
        std::thread::spawn(move || drop(lease)).join().unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), Some(2));
        assert_eq!(probe.connects(), 2);
        assert_eq!(probe.closes(), 1);
        assert!(probe.max_open() <= 1);
    }

    #[test]
    fn waiter_fails_when_no_runtime_can_replace_a_closed_connection() {
        let probe = Probe::default();
        // Created outside any runtime, so the pool has no handle to fall back on.
        let pool = pool(1, &probe);
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let mut lease = pool.acquire().await.unwrap();
            lease.mark_broken();
            let waiter = {
                let pool = pool.clone();
                tokio::spawn(async move { pool.acquire().await.map(|l| l.connection_id()) })
            };
            while pool.status().waiting == 0 {
                tokio::task::yield_now().await;
            }
            std::thread::spawn(move || drop(lease)).join().unwrap();

            assert!(matches!(
                waiter.await.unwrap(),
                Err(SqlBridgeError::ConnectionError(_))
            ));
            assert_eq!(probe.closes(), 1);
            assert_eq!(pool.status().size, 0);
            assert_eq!(pool.status().waiting, 0);
        });
    }

    #[tokio::test]
    async fn grant_that_races_the_timeout_is_kept() {
        let probe = Probe::default();
        let pool = pool(1, &probe);
        let held = pool.acquire().await.unwrap();
        let id = held.connection_id();

        let (tx, rx) = oneshot::channel();
        let waiter_id = pool.shared.lock().waiters.push(tx);
        let pending = PendingLease::new(waiter_id, rx, Arc::clone(&pool.shared));
        // Released after the deadline fired but before the waiter left the queue.
        drop(held);

        let lease = pending.expire(Duration::from_millis(5)).unwrap();
        assert_eq!(lease.connection_id(), id);
        assert_eq!(pool.status().waiting, 0);
        assert_eq!(pool.status().idle, 0);
    }

    #[tokio::test]
    async fn expiry_without_a_grant_times_out() {
        let probe = Probe::default();
        let pool = pool(1, &probe);
        let _held = pool.acquire().await.unwrap();

        let (tx, rx) = oneshot::channel();
        let waiter_id = pool.shared.lock().waiters.push(tx);
        let pending = PendingLease::new(waiter_id, rx, Arc::clone(&pool.shared));

        let waited = Duration::from_millis(5);
        assert!(matches!(
            pending.expire(waited),
            Err(SqlBridgeError::PoolTimeout(d)) if d == waited
        ));
        assert_eq!(pool.status().waiting, 0);
    }

    #[tokio::test]
    async fn idle_timeout_evicts_on_acquire() {
        let probe = Probe::default();
        let pool = ConnectionPool::new(
            Arc::new(ScriptedDriver::with_probe(probe.clone())),
            ConnectOptions::new("mock:idle"),
            PoolOptions::builder()
                .max_size(2)
                .idle_timeout(Duration::from_millis(20))
                .finish(),
        )
        .unwrap();

        drop(pool.acquire().await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        let lease = pool.acquire().await.unwrap();
        assert_eq!(lease.connection_id(), Some(2));
        assert_eq!(probe.connects(), 2);
    }
}
