use serde::{Deserialize, Serialize};

use crate::clock::VectorClock;
use crate::wire::WireCrdt;
use crate::{Crdt, CrdtError, GCounter, Replicated};

/// A positive-negative counter (PN-Counter).
///
/// Supports both increment and decrement operations by maintaining two
/// internal G-Counters: one for increments and one for decrements.
/// The value is `positive - negative`.
///
/// # Example
///
/// ```
/// use crdt_graph::prelude::*;
///
/// let mut c1 = PNCounter::new("node-1");
/// c1.increment(2).unwrap();
/// c1.decrement(1).unwrap();
/// assert_eq!(c1.value(), 1);
///
/// let mut c2 = PNCounter::new("node-2");
/// c2.decrement(1).unwrap();
///
/// c1.merge(&c2);
/// assert_eq!(c1.value(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub struct PNCounter {
    node_id: String,
    vector_clock: VectorClock,
    positive: GCounter,
    negative: GCounter,
}

impl PNCounter {
    /// Create a new PN-Counter for the given replica.
    pub fn new(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            positive: GCounter::new(node_id.clone()),
            negative: GCounter::new(node_id.clone()),
            node_id,
            vector_clock: VectorClock::new(),
        }
    }

    /// Increase the counter by `|amount|`.
    ///
    /// The sign of `amount` is ignored: direction is chosen by the method.
    pub fn increment(&mut self, amount: i64) -> Result<(), CrdtError> {
        self.positive.add(amount.unsigned_abs())?;
        self.vector_clock.tick(&self.node_id);
        Ok(())
    }

    /// Decrease the counter by `|amount|`.
    pub fn decrement(&mut self, amount: i64) -> Result<(), CrdtError> {
        self.negative.add(amount.unsigned_abs())?;
        self.vector_clock.tick(&self.node_id);
        Ok(())
    }

    /// Get the current counter value (`positive - negative`), saturating at
    /// the bounds of `i64`.
    #[must_use]
    pub fn value(&self) -> i64 {
        let diff = i128::from(self.positive.value()) - i128::from(self.negative.value());
        diff.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    /// The grow-only counter of increments.
    #[must_use]
    pub fn positive(&self) -> &GCounter {
        &self.positive
    }

    /// The grow-only counter of decrements.
    #[must_use]
    pub fn negative(&self) -> &GCounter {
        &self.negative
    }
}

impl Crdt for PNCounter {
    fn merge(&mut self, other: &Self) {
        self.positive.merge(&other.positive);
        self.negative.merge(&other.negative);
        self.vector_clock.update_from(&other.vector_clock);
    }
}

impl Replicated for PNCounter {
    fn replica_id(&self) -> &str {
        &self.node_id
    }

    fn vector_clock(&self) -> &VectorClock {
        &self.vector_clock
    }

    fn bind_replica(&mut self, replica: &str) {
        self.node_id = replica.to_string();
        self.positive.bind_replica(replica);
        self.negative.bind_replica(replica);
    }
}

impl WireCrdt for PNCounter {
    const TYPE_NAME: &'static str = "PNCounter";
}
