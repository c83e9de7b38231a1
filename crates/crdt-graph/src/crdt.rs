use crate::clock::VectorClock;
use crate::CrdtError;

/// Core trait that all CRDTs must implement.
///
/// A CRDT (Conflict-free Replicated Data Type) guarantees that concurrent
/// updates on different replicas will converge to the same state after merging,
/// without requiring coordination.
///
/// # Properties
///
/// All implementations must satisfy:
/// - **Commutativity:** `a.merge(b) == b.merge(a)`
/// - **Associativity:** `a.merge(b.merge(c)) == a.merge(b).merge(c)`
/// - **Idempotency:** `a.merge(a) == a`
pub trait Crdt {
    /// Merge another replica's state into this one.
    ///
    /// After merging, `self` contains the least upper bound of both states.
    /// This operation is commutative, associative, and idempotent.
    fn merge(&mut self, other: &Self);

    /// Check that `other` can be merged into `self`.
    ///
    /// Statically typed CRDTs are always compatible. Dynamically typed values
    /// (see [`AnyCrdt`](crate::AnyCrdt)) report
    /// [`CrdtError::TypeMismatch`] when the concrete types differ.
    fn validate_merge(&self, other: &Self) -> Result<(), CrdtError> {
        let _ = other;
        Ok(())
    }

    /// Validate, then merge. On error `self` is left untouched.
    fn try_merge(&mut self, other: &Self) -> Result<(), CrdtError> {
        self.validate_merge(other)?;
        self.merge(other);
        Ok(())
    }
}

/// A CRDT instance owned by a single replica.
///
/// The replica id drives vector-clock ticks, ORSet tag generation and
/// last-writer-wins tie breaking.
pub trait Replicated {
    /// The replica that owns this instance.
    fn replica_id(&self) -> &str;

    /// The causal history observed by this instance.
    fn vector_clock(&self) -> &VectorClock;

    /// Re-home this instance, and every CRDT nested inside it, onto `replica`.
    ///
    /// Used when a value received from a remote replica is adopted locally:
    /// subsequent local writes must tick the local replica's clock entry.
    fn bind_replica(&mut self, replica: &str);
}
