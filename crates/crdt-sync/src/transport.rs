use std::sync::Arc;

use parking_lot::Mutex;

use crate::TransportError;

/// Delivers serialized CRDT state to peer replicas.
///
/// Delivery may be at-least-once and unordered; merges tolerate both.
/// Remote payloads come back in through
/// [`SyncHandle::on_remote_update`](crate::SyncHandle::on_remote_update).
pub trait Transport: Send + Sync + 'static {
    /// Send the full state of the CRDT registered as `crdt_name`.
    fn broadcast(&self, crdt_name: &str, payload: &str) -> Result<(), TransportError>;
}

impl<T: Transport> Transport for Arc<T> {
    fn broadcast(&self, crdt_name: &str, payload: &str) -> Result<(), TransportError> {
        (**self).broadcast(crdt_name, payload)
    }
}

/// One payload handed to a [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    /// Registered name of the CRDT.
    pub crdt_name: String,
    /// JSON wire form.
    pub payload: String,
}

/// In-memory transport.
///
/// Records every broadcast instead of sending it anywhere. Clones share
/// the same log, so a test can keep one clone and hand the other to a
/// [`SyncManager`](crate::SyncManager).
///
/// # Example
///
/// ```
/// use crdt_sync::{MemoryTransport, Transport};
///
/// let transport = MemoryTransport::new();
/// transport.broadcast("hits", "{}").unwrap();
///
/// let sent = transport.take();
/// assert_eq!(sent[0].crdt_name, "hits");
/// assert!(transport.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryLog>>,
}

#[derive(Debug, Default)]
struct MemoryLog {
    sent: Vec<Broadcast>,
    /// broadcasts still to reject
    failures: usize,
}

impl MemoryTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every broadcast recorded so far.
    pub fn sent(&self) -> Vec<Broadcast> {
        self.inner.lock().sent.clone()
    }

    /// Drain the recorded broadcasts.
    pub fn take(&self) -> Vec<Broadcast> {
        std::mem::take(&mut self.inner.lock().sent)
    }

    /// Number of recorded broadcasts.
    pub fn len(&self) -> usize {
        self.inner.lock().sent.len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().sent.is_empty()
    }

    /// Reject the next `count` broadcasts, as a flaky network would.
    pub fn fail_next(&self, count: usize) {
        self.inner.lock().failures = count;
    }
}

impl Transport for MemoryTransport {
    fn broadcast(&self, crdt_name: &str, payload: &str) -> Result<(), TransportError> {
        let mut log = self.inner.lock();
        if log.failures > 0 {
            log.failures -= 1;
            return Err(TransportError::new("simulated delivery failure"));
        }
        log.sent.push(Broadcast {
            crdt_name: crdt_name.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}
