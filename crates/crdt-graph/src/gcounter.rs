use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::clock::VectorClock;
use crate::wire::{pairs, WireCrdt};
use crate::{Crdt, CrdtError, Replicated};

/// A grow-only counter (G-Counter).
///
/// Each replica maintains its own count. The total value is the sum of all
/// replica counts. This counter can only be incremented, never decremented.
///
/// # Example
///
/// ```
/// use crdt_graph::prelude::*;
///
/// let mut c1 = GCounter::new("node-1");
/// c1.increment();
/// c1.increment();
///
/// let mut c2 = GCounter::new("node-2");
/// c2.increment();
///
/// c1.merge(&c2);
/// assert_eq!(c1.value(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub struct GCounter {
    node_id: String,
    vector_clock: VectorClock,
    #[serde(with = "pairs")]
    counters: BTreeMap<String, u64>,
}

impl GCounter {
    /// Create a new G-Counter for the given replica.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            vector_clock: VectorClock::new(),
            counters: BTreeMap::new(),
        }
    }

    /// Increment this replica's count by 1.
    ///
    /// Saturates: at `u64::MAX` the call leaves the counter unchanged. Use
    /// [`increment_by`](Self::increment_by) to observe the overflow.
    pub fn increment(&mut self) {
        if let Err(err) = self.add(1) {
            trace!(node = %self.node_id, %err, "increment saturated");
        }
    }

    /// Increment this replica's count by `amount`.
    ///
    /// Fails with [`CrdtError::InvalidArgument`] if `amount` is negative or
    /// the local count would overflow; the counter is left unchanged.
    pub fn increment_by(&mut self, amount: i64) -> Result<(), CrdtError> {
        let amount = u64::try_from(amount).map_err(|_| {
            CrdtError::InvalidArgument(format!(
                "grow-only counter cannot be incremented by {amount}"
            ))
        })?;
        self.add(amount)
    }

    pub(crate) fn add(&mut self, amount: u64) -> Result<(), CrdtError> {
        let current = self.count_for(&self.node_id);
        let next = current.checked_add(amount).ok_or_else(|| {
            CrdtError::InvalidArgument(format!("counter overflow adding {amount} to {current}"))
        })?;
        self.vector_clock.tick(&self.node_id);
        self.counters.insert(self.node_id.clone(), next);
        Ok(())
    }

    /// Get the total counter value across all replicas.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.counters
            .values()
            .fold(0u64, |total, &count| total.saturating_add(count))
    }

    /// Get the count for a specific replica.
    #[must_use]
    pub fn count_for(&self, node_id: &str) -> u64 {
        self.counters.get(node_id).copied().unwrap_or(0)
    }
}

impl Crdt for GCounter {
    fn merge(&mut self, other: &Self) {
        for (node, &count) in &other.counters {
            let entry = self.counters.entry(node.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
        self.vector_clock.update_from(&other.vector_clock);
    }
}

impl Replicated for GCounter {
    fn replica_id(&self) -> &str {
        &self.node_id
    }

    fn vector_clock(&self) -> &VectorClock {
        &self.vector_clock
    }

    fn bind_replica(&mut self, replica: &str) {
        self.node_id = replica.to_string();
    }
}

impl WireCrdt for GCounter {
    const TYPE_NAME: &'static str = "GCounter";
}
