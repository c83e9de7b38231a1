use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clock::{ClockOrdering, VectorClock};
use crate::wire::{pairs, WireCrdt};
use crate::{Crdt, Replicated};

/// A multi-value register (MV-Register).
///
/// Unlike LWW-Register, this preserves all concurrently written values.
/// When concurrent writes occur, all values are kept until a subsequent
/// write supersedes them. This is useful when you want to detect conflicts
/// rather than silently resolving them.
///
/// Every write is keyed by the writer's vector clock at the time of the
/// write. The register only ever holds writes whose clocks are mutually
/// concurrent.
///
/// # Example
///
/// ```
/// use crdt_graph::prelude::*;
///
/// let mut r1 = MVRegister::new("node-1");
/// r1.assign("alice");
///
/// let mut r2 = MVRegister::new("node-2");
/// r2.assign("bob");
///
/// r1.merge(&r2);
/// // Both values are preserved as concurrent writes
/// let values = r1.values();
/// assert!(values.contains(&&"alice"));
/// assert!(values.contains(&&"bob"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    bound(serialize = "T: Serialize", deserialize = "T: DeserializeOwned")
)]
pub struct MVRegister<T> {
    node_id: String,
    vector_clock: VectorClock,
    #[serde(with = "pairs")]
    values: BTreeMap<VectorClock, MvEntry<T>>,
}

/// A single write held by an [`MVRegister`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MvEntry<T> {
    /// The written value.
    pub value: T,
    /// The replica that wrote it.
    pub node_id: String,
}

impl<T: Clone> MVRegister<T> {
    /// Create a new empty MV-Register for the given replica.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            vector_clock: VectorClock::new(),
            values: BTreeMap::new(),
        }
    }

    /// Set a new value, superseding every value this replica has observed.
    pub fn assign(&mut self, value: T) {
        self.vector_clock.tick(&self.node_id);
        self.values.clear();
        self.values.insert(
            self.vector_clock.clone(),
            MvEntry {
                value,
                node_id: self.node_id.clone(),
            },
        );
    }

    /// Get all current values.
    ///
    /// Returns a single value during normal operation, or multiple values
    /// when concurrent writes have been merged without a subsequent write.
    #[must_use]
    pub fn values(&self) -> Vec<&T> {
        self.values.values().map(|write| &write.value).collect()
    }

    /// Iterate over the undominated writes with their clocks.
    pub fn writes(&self) -> impl Iterator<Item = (&VectorClock, &MvEntry<T>)> {
        self.values.iter()
    }

    /// Returns `true` if there are concurrent (conflicting) values.
    #[must_use]
    pub fn is_conflicted(&self) -> bool {
        self.values.len() > 1
    }

    /// Returns `true` if nothing has been written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<T: Clone> Crdt for MVRegister<T> {
    fn merge(&mut self, other: &Self) {
        // A clock identifies a single write, so the union is keyed by clock.
        let mut union = self.values.clone();
        for (clock, write) in &other.values {
            union.entry(clock.clone()).or_insert_with(|| write.clone());
        }

        let clocks: Vec<VectorClock> = union.keys().cloned().collect();
        union.retain(|clock, _| {
            !clocks
                .iter()
                .any(|candidate| clock.compare(candidate) == ClockOrdering::Less)
        });

        self.values = union;
        self.vector_clock.update_from(&other.vector_clock);
    }
}

impl<T> Replicated for MVRegister<T> {
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

impl<T> WireCrdt for MVRegister<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    const TYPE_NAME: &'static str = "MVRegister";
}
