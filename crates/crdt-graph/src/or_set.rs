use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clock::VectorClock;
use crate::wire::{pairs, WireCrdt};
use crate::{Crdt, Replicated};

/// An observed-remove set (OR-Set), also known as an add-wins set.
///
/// Elements can be freely added and removed, and re-added after removal.
/// Each add operation generates a globally unique tag. Remove only
/// tombstones the tags that the remover has observed, so concurrent adds
/// are preserved.
///
/// Tag records are never deleted: a removed element keeps its tags, all of
/// them listed in the tombstone set.
///
/// # Example
///
/// ```
/// use crdt_graph::prelude::*;
///
/// let mut s1 = ORSet::new("node-1");
/// s1.add("apple");
/// s1.add("banana");
/// s1.remove(&"banana");
///
/// let mut s2 = ORSet::new("node-2");
/// s2.add("banana"); // concurrent add
///
/// s1.merge(&s2);
/// // banana is present because s2's add was concurrent with s1's remove
/// assert!(s1.contains(&"banana"));
/// assert!(s1.contains(&"apple"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    bound(
        serialize = "T: Serialize + Ord",
        deserialize = "T: DeserializeOwned + Ord"
    )
)]
pub struct ORSet<T: Ord> {
    node_id: String,
    vector_clock: VectorClock,
    /// element -> every tag ever issued for it
    #[serde(with = "pairs")]
    elements: BTreeMap<T, BTreeSet<String>>,
    /// Tombstones: tags that have been removed
    removed: BTreeSet<String>,
}

impl<T: Ord + Clone> ORSet<T> {
    /// Create a new empty OR-Set for the given replica.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            vector_clock: VectorClock::new(),
            elements: BTreeMap::new(),
            removed: BTreeSet::new(),
        }
    }

    /// Add an element to the set.
    ///
    /// Generates a unique tag for this insertion. Even if the element
    /// was previously removed, this new tag allows it to be re-added.
    pub fn add(&mut self, element: T) {
        let counter = self.vector_clock.tick(&self.node_id);
        let suffix: u32 = rand::thread_rng().gen();
        let tag = format!("{}:{}:{:08x}", self.node_id, counter, suffix);
        self.elements.entry(element).or_default().insert(tag);
    }

    /// Remove an element from the set.
    ///
    /// Only tombstones the tags that this replica has observed. Concurrent
    /// adds on other replicas will survive the merge. Removing an absent
    /// element is a no-op.
    ///
    /// Returns `true` if the element was present and removed.
    pub fn remove(&mut self, element: &T) -> bool {
        if !self.contains(element) {
            return false;
        }
        if let Some(tags) = self.elements.get(element) {
            self.removed.extend(tags.iter().cloned());
        }
        self.vector_clock.tick(&self.node_id);
        true
    }

    /// Check if the set contains an element.
    #[must_use]
    pub fn contains(&self, element: &T) -> bool {
        self.elements
            .get(element)
            .is_some_and(|tags| tags.iter().any(|tag| !self.removed.contains(tag)))
    }

    /// Get the number of distinct live elements in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Check if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Iterate over the live elements in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements
            .iter()
            .filter(|(_, tags)| tags.iter().any(|tag| !self.removed.contains(tag)))
            .map(|(element, _)| element)
    }

    /// All live elements in ascending order.
    #[must_use]
    pub fn values(&self) -> Vec<&T> {
        self.iter().collect()
    }

    /// Number of tombstoned tags retained by this replica.
    #[must_use]
    pub fn tombstone_count(&self) -> usize {
        self.removed.len()
    }
}

impl<T: Ord + Clone> Crdt for ORSet<T> {
    fn merge(&mut self, other: &Self) {
        for (element, other_tags) in &other.elements {
            self.elements
                .entry(element.clone())
                .or_default()
                .extend(other_tags.iter().cloned());
        }
        self.removed.extend(other.removed.iter().cloned());
        self.vector_clock.update_from(&other.vector_clock);
    }
}

impl<T: Ord> Replicated for ORSet<T> {
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

impl<T> WireCrdt for ORSet<T>
where
    T: Ord + Clone + Serialize + DeserializeOwned,
{
    const TYPE_NAME: &'static str = "ORSet";
}
