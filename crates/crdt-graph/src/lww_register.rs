use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clock::VectorClock;
use crate::wire::WireCrdt;
use crate::{Crdt, Replicated};

/// A last-writer-wins register (LWW-Register).
///
/// Resolves concurrent writes by keeping the value with the highest
/// `(timestamp, writer)` pair: the larger timestamp wins and ties are broken
/// by comparing writer replica ids lexicographically.
///
/// Timestamps are logical. A local [`assign`](Self::assign) takes
/// `max(tick, timestamp + 1)`, so it supersedes every write this register
/// has observed.
///
/// # Example
///
/// ```
/// use crdt_graph::prelude::*;
///
/// let mut r1 = LWWRegister::with_timestamp("node-a", "red", 3);
/// let mut r2 = LWWRegister::with_timestamp("node-b", "blue", 3);
///
/// r1.merge(&r2);
/// r2.merge(&r1);
/// // Same timestamp: the larger writer id wins on both sides.
/// assert_eq!(*r1.get(), "blue");
/// assert_eq!(*r2.get(), "blue");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    bound(serialize = "T: Serialize", deserialize = "T: DeserializeOwned")
)]
pub struct LWWRegister<T> {
    node_id: String,
    vector_clock: VectorClock,
    value: T,
    timestamp: u64,
    writer_node_id: String,
}

impl<T: Clone> LWWRegister<T> {
    /// Create a register holding `value`, written by `node_id` at a fresh
    /// timestamp.
    pub fn new(node_id: impl Into<String>, value: T) -> Self {
        let mut register = Self::with_timestamp(node_id, value, 0);
        register.timestamp = register.next_timestamp();
        register
    }

    /// Create a register with an explicit timestamp.
    ///
    /// Useful for testing, replay, or an initial value that any real write
    /// should supersede (timestamp `0`).
    pub fn with_timestamp(node_id: impl Into<String>, value: T, timestamp: u64) -> Self {
        let node_id = node_id.into();
        Self {
            writer_node_id: node_id.clone(),
            node_id,
            vector_clock: VectorClock::new(),
            value,
            timestamp,
        }
    }

    /// A placeholder register that loses to any real write, including one
    /// at timestamp `0`.
    pub(crate) fn unset(node_id: impl Into<String>, value: T) -> Self {
        let mut register = Self::with_timestamp(node_id, value, 0);
        register.writer_node_id.clear();
        register
    }

    /// Overwrite the value at a timestamp strictly above every one observed.
    pub fn assign(&mut self, value: T) {
        self.timestamp = self.next_timestamp();
        self.value = value;
        self.writer_node_id = self.node_id.clone();
    }

    fn next_timestamp(&mut self) -> u64 {
        let tick = self.vector_clock.tick(&self.node_id);
        tick.max(self.timestamp.saturating_add(1))
    }

    /// Get the current value.
    #[must_use]
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Get the timestamp of the winning write.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The replica that performed the winning write.
    #[must_use]
    pub fn writer(&self) -> &str {
        &self.writer_node_id
    }
}

impl<T: Clone> Crdt for LWWRegister<T> {
    fn merge(&mut self, other: &Self) {
        let ours = (self.timestamp, self.writer_node_id.as_str());
        let theirs = (other.timestamp, other.writer_node_id.as_str());
        if theirs > ours {
            self.value = other.value.clone();
            self.timestamp = other.timestamp;
            self.writer_node_id = other.writer_node_id.clone();
        }
        self.vector_clock.update_from(&other.vector_clock);
    }
}

impl<T> Replicated for LWWRegister<T> {
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

impl<T> WireCrdt for LWWRegister<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    const TYPE_NAME: &'static str = "LWWRegister";
}
