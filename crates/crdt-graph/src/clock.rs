//! Vector clocks for causal ordering.
//!
//! A vector clock maps each replica id to the number of events that replica
//! has produced. Comparing two clocks tells whether one state causally
//! precedes the other or whether they were produced concurrently.
//!
//! # Example
//!
//! ```
//! use crdt_graph::clock::{ClockOrdering, VectorClock};
//!
//! let mut a = VectorClock::new();
//! a.tick("node-a");
//!
//! let mut b = a.clone();
//! b.tick("node-b");
//! assert_eq!(a.compare(&b), ClockOrdering::Less);
//!
//! a.tick("node-a");
//! assert_eq!(a.compare(&b), ClockOrdering::Concurrent);
//!
//! a.update_from(&b);
//! assert_eq!(a.compare(&b), ClockOrdering::Greater);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Result of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockOrdering {
    /// Both clocks have identical entries.
    Equal,
    /// The left clock causally precedes the right one.
    Less,
    /// The left clock causally follows the right one.
    Greater,
    /// Neither clock dominates the other.
    Concurrent,
}

/// A replica-id to counter map.
///
/// A replica only ever increments its own entry (via [`tick`](Self::tick));
/// other entries are raised only by [`update_from`](Self::update_from).
///
/// The derived `Ord` is a lexicographic order over entries, used to key
/// storage deterministically. Use [`compare`](Self::compare) for causality.
///
/// Wire form: `[[replica-id, counter], ...]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<(String, u64)>", from = "Vec<(String, u64)>")]
pub struct VectorClock {
    entries: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Create an empty clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment `replica`'s entry by one and return the new value.
    pub fn tick(&mut self, replica: &str) -> u64 {
        let counter = self.entries.entry(replica.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Raise every entry to the maximum of the local and remote value.
    pub fn update_from(&mut self, other: &VectorClock) {
        for (replica, &count) in &other.entries {
            let entry = self.entries.entry(replica.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
    }

    /// Entrywise comparison across the union of both key sets.
    /// Missing entries count as zero.
    #[must_use]
    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        let mut less = false;
        let mut greater = false;

        for replica in self.entries.keys().chain(other.entries.keys()) {
            let mine = self.get(replica);
            let theirs = other.get(replica);
            if mine < theirs {
                less = true;
            } else if mine > theirs {
                greater = true;
            }
            if less && greater {
                return ClockOrdering::Concurrent;
            }
        }

        match (less, greater) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Less,
            (false, true) => ClockOrdering::Greater,
            (true, true) => ClockOrdering::Concurrent,
        }
    }

    /// Returns `true` if every entry of `self` is at least the matching
    /// entry of `other`.
    #[must_use]
    pub fn dominates(&self, other: &VectorClock) -> bool {
        matches!(
            self.compare(other),
            ClockOrdering::Equal | ClockOrdering::Greater
        )
    }

    /// The counter recorded for `replica` (zero when absent).
    #[must_use]
    pub fn get(&self, replica: &str) -> u64 {
        self.entries.get(replica).copied().unwrap_or(0)
    }

    /// Iterate over `(replica, counter)` entries in replica order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(r, &c)| (r.as_str(), c))
    }

    /// Number of replicas with an entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no replica has ticked this clock.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<VectorClock> for Vec<(String, u64)> {
    fn from(clock: VectorClock) -> Self {
        clock.entries.into_iter().collect()
    }
}

impl From<Vec<(String, u64)>> for VectorClock {
    fn from(entries: Vec<(String, u64)>) -> Self {
        let mut clock = VectorClock::new();
        for (replica, count) in entries {
            let entry = clock.entries.entry(replica).or_insert(0);
            *entry = (*entry).max(count);
        }
        clock
    }
}
