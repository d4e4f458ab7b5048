use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use super::{Lease, Shared};
use crate::error::SqlBridgeError;

pub(super) type Grant = Result<Lease, SqlBridgeError>;

/// A queued acquire request.
pub(super) struct Waiter {
    id: u64,
    tx: oneshot::Sender<Grant>,
}

impl Waiter {
    /// Deliver `grant`, handing it back if the requester has gone away.
    pub(super) fn send(self, grant: Grant) -> Result<(), Grant> {
        self.tx.send(grant)
    }
}

/// FIFO queue of acquire requests, served strictly in arrival order.
#[derive(Default)]
pub(super) struct WaitQueue {
    waiters: VecDeque<Waiter>,
    next_id: u64,
}

impl WaitQueue {
    pub(super) fn push(&mut self, tx: oneshot::Sender<Grant>) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.waiters.push_back(Waiter { id, tx });
        id
    }

    pub(super) fn pop_front(&mut self) -> Option<Waiter> {
        self.waiters.pop_front()
    }

    /// Remove a waiter that gave up; false if it was already served.
    pub(super) fn remove(&mut self, id: u64) -> bool {
        match self.waiters.iter().position(|w| w.id == id) {
            Some(idx) => self.waiters.remove(idx).is_some(),
            None => false,
        }
    }

    pub(super) fn drain(&mut self) -> Vec<Waiter> {
        self.waiters.drain(..).collect()
    }

    pub(super) fn len(&self) -> usize {
        self.waiters.len()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

/// The caller's side of a queued request.
///
/// Dropping it (cancellation) removes the request from the queue; a lease that was granted in
/// the meantime is released again.
pub(super) struct PendingLease {
    id: u64,
    rx: Option<oneshot::Receiver<Grant>>,
    shared: Arc<Shared>,
}

impl PendingLease {
    pub(super) fn new(id: u64, rx: oneshot::Receiver<Grant>, shared: Arc<Shared>) -> Self {
        Self {
            id,
            rx: Some(rx),
            shared,
        }
    }

    pub(super) async fn recv(&mut self) -> Grant {
        let Some(rx) = self.rx.as_mut() else {
            return Err(SqlBridgeError::PoolClosed);
        };
        let grant = rx.await.unwrap_or(Err(SqlBridgeError::PoolClosed));
        self.rx = None;
        grant
    }

    /// Give up after `waited`. A grant that reached us before we could leave the queue wins.
    pub(super) fn expire(mut self, waited: Duration) -> Grant {
        let rx = self.rx.take();
        let removed = self.shared.lock().waiters.remove(self.id);
        if removed {
            tracing::debug!(waiter = self.id, ?waited, "acquire timed out");
            return Err(SqlBridgeError::PoolTimeout(waited));
        }
        match rx.map(|mut rx| rx.try_recv()) {
            Some(Ok(grant)) => grant,
            _ => Err(SqlBridgeError::PoolTimeout(waited)),
        }
    }
}

impl Drop for PendingLease {
    fn drop(&mut self) {
        let Some(rx) = self.rx.take() else {
            return;
        };
        let removed = self.shared.lock().waiters.remove(self.id);
        if !removed {
            tracing::debug!(waiter = self.id, "dropping lease granted to a cancelled request");
        }
        // Any grant still in the channel is released here, outside the pool lock.
        drop(rx);
    }
}
