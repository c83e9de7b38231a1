use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::clock::VectorClock;
use crate::wire::{pairs, WireCrdt};
use crate::{Crdt, CrdtError, ORSet, Replicated};

/// An observed-remove map whose values are themselves CRDTs.
///
/// The key set is an [`ORSet`]; a key is visible only while the set says it
/// is present. Deleting a key tombstones it but keeps the value internally,
/// so a concurrent update on another replica still has something to merge
/// into.
///
/// # Example
///
/// ```
/// use crdt_graph::prelude::*;
///
/// let mut m1: ORMap<String, GCounter> = ORMap::new("node-1");
/// m1.set("visits".to_string(), GCounter::new("node-1"));
/// m1.update(&"visits".to_string(), |c| c.increment()).unwrap();
///
/// let mut m2 = ORMap::new("node-2");
/// m2.merge(&m1);
/// m2.update(&"visits".to_string(), |c| c.increment()).unwrap();
///
/// m1.merge(&m2);
/// assert_eq!(m1.get(&"visits".to_string()).unwrap().value(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    bound(
        serialize = "K: Serialize + Ord, V: Serialize",
        deserialize = "K: DeserializeOwned + Ord, V: DeserializeOwned"
    )
)]
pub struct ORMap<K: Ord, V> {
    node_id: String,
    vector_clock: VectorClock,
    keys: ORSet<K>,
    #[serde(with = "pairs")]
    values: BTreeMap<K, V>,
}

impl<K, V> ORMap<K, V>
where
    K: Ord + Clone,
    V: Crdt + Replicated + Clone,
{
    /// Create an empty map owned by `node_id`.
    pub fn new(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            keys: ORSet::new(node_id.clone()),
            node_id,
            vector_clock: VectorClock::new(),
            values: BTreeMap::new(),
        }
    }

    /// Store `value` under `key`, replacing any value already there.
    ///
    /// Other replicas may still hold the replaced value, and it merges back
    /// into `value` on the next sync. Use [`upsert`](Self::upsert) to build on
    /// the retained value so the new state supersedes it.
    pub fn set(&mut self, key: K, mut value: V) {
        self.vector_clock.tick(&self.node_id);
        value.bind_replica(&self.node_id);
        self.keys.add(key.clone());
        self.values.insert(key, value);
    }

    /// Make `key` visible again and mutate its value.
    ///
    /// `f` receives the value retained for `key`, whether visible or
    /// tombstoned, or `init()` when none exists. Nothing changes if `f`
    /// fails.
    pub fn upsert<R>(
        &mut self,
        key: K,
        init: impl FnOnce() -> V,
        f: impl FnOnce(&mut V) -> Result<R, CrdtError>,
    ) -> Result<R, CrdtError> {
        let mut value = match self.values.get(&key) {
            Some(retained) => retained.clone(),
            None => {
                let mut fresh = init();
                fresh.bind_replica(&self.node_id);
                fresh
            }
        };
        let result = f(&mut value)?;
        self.vector_clock.tick(&self.node_id);
        self.keys.add(key.clone());
        self.values.insert(key, value);
        Ok(result)
    }

    /// The value held for `key`, including one whose key is tombstoned.
    #[must_use]
    pub fn retained(&self, key: &K) -> Option<&V> {
        self.values.get(key)
    }

    /// Tombstone `key`.
    ///
    /// Fails with [`CrdtError::NotFound`] if the key is not visible.
    pub fn delete(&mut self, key: &K) -> Result<(), CrdtError> {
        if !self.keys.remove(key) {
            return Err(CrdtError::NotFound("map key".into()));
        }
        self.vector_clock.tick(&self.node_id);
        Ok(())
    }

    /// Mutate the value under `key` in place.
    ///
    /// Fails with [`CrdtError::NotFound`] if the key is not visible.
    pub fn update<R>(&mut self, key: &K, f: impl FnOnce(&mut V) -> R) -> Result<R, CrdtError> {
        if !self.keys.contains(key) {
            return Err(CrdtError::NotFound("map key".into()));
        }
        let value = self
            .values
            .get_mut(key)
            .ok_or_else(|| CrdtError::NotFound("map value".into()))?;
        let result = f(value);
        self.vector_clock.tick(&self.node_id);
        Ok(result)
    }

    /// Like [`update`](Self::update) for fallible mutations. The map's clock
    /// only advances when `f` succeeds.
    pub fn try_update<R>(
        &mut self,
        key: &K,
        f: impl FnOnce(&mut V) -> Result<R, CrdtError>,
    ) -> Result<R, CrdtError> {
        if !self.keys.contains(key) {
            return Err(CrdtError::NotFound("map key".into()));
        }
        let value = self
            .values
            .get_mut(key)
            .ok_or_else(|| CrdtError::NotFound("map value".into()))?;
        let result = f(value)?;
        self.vector_clock.tick(&self.node_id);
        Ok(result)
    }

    /// Get the value stored under a visible key.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        if self.keys.contains(key) {
            self.values.get(key)
        } else {
            None
        }
    }

    /// Returns `true` if `key` is visible.
    #[must_use]
    pub fn has(&self, key: &K) -> bool {
        self.keys.contains(key) && self.values.contains_key(key)
    }

    /// Iterate over visible entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> {
        self.values
            .iter()
            .filter(|(key, _)| self.keys.contains(key))
    }

    /// Iterate over visible keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries().map(|(key, _)| key)
    }

    /// Number of visible entries.
    #[must_use]
    pub fn size(&self) -> usize {
        self.entries().count()
    }

    /// Returns `true` if no entry is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }
}

impl<K, V> Crdt for ORMap<K, V>
where
    K: Ord + Clone,
    V: Crdt + Replicated + Clone,
{
    fn merge(&mut self, other: &Self) {
        self.keys.merge(&other.keys);
        for (key, theirs) in &other.values {
            match self.values.get_mut(key) {
                Some(ours) => ours.merge(theirs),
                None => {
                    let mut adopted = theirs.clone();
                    adopted.bind_replica(&self.node_id);
                    self.values.insert(key.clone(), adopted);
                }
            }
        }
        self.vector_clock.update_from(&other.vector_clock);
        trace!(node = %self.node_id, entries = self.values.len(), "merged map");
    }

    fn validate_merge(&self, other: &Self) -> Result<(), CrdtError> {
        for (key, theirs) in &other.values {
            if let Some(ours) = self.values.get(key) {
                ours.validate_merge(theirs)?;
            }
        }
        Ok(())
    }
}

impl<K, V> Replicated for ORMap<K, V>
where
    K: Ord,
    V: Replicated,
{
    fn replica_id(&self) -> &str {
        &self.node_id
    }

    fn vector_clock(&self) -> &VectorClock {
        &self.vector_clock
    }

    fn bind_replica(&mut self, replica: &str) {
        self.node_id = replica.to_string();
        self.keys.bind_replica(replica);
        for value in self.values.values_mut() {
            value.bind_replica(replica);
        }
    }
}

impl<K, V> WireCrdt for ORMap<K, V>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
    V: Crdt + Replicated + Clone + Serialize + DeserializeOwned,
{
    const TYPE_NAME: &'static str = "ORMap";
}
