//! # crdt-graph
//!
//! State-based CRDTs and a replicated knowledge graph for loosely-coupled
//! agents that share what they learn without a coordinator.
//!
//! Every replica mutates its own copy and periodically ships the whole
//! state to its peers. Merging is commutative, associative and idempotent,
//! so replicas that have seen the same updates hold the same state no
//! matter the order or duplication of deliveries.
//!
//! ## Quick Start
//!
//! ```
//! use crdt_graph::prelude::*;
//!
//! // Grow-only counter
//! let mut c1 = GCounter::new("agent-1");
//! c1.increment();
//!
//! let mut c2 = GCounter::new("agent-2");
//! c2.increment();
//!
//! c1.merge(&c2);
//! assert_eq!(c1.value(), 2);
//! ```
//!
//! ## Available CRDTs
//!
//! ### Counters
//! - [`GCounter`] - Grow-only counter (increment only)
//! - [`PNCounter`] - Positive-negative counter (increment and decrement)
//!
//! ### Registers
//! - [`LWWRegister`] - Last-writer-wins register (logical timestamp resolution)
//! - [`MVRegister`] - Multi-value register (preserves concurrent writes)
//!
//! ### Collections
//! - [`ORSet`] - Observed-remove set (add and remove freely)
//! - [`ORMap`] - Observed-remove map with CRDT values
//!
//! ### Domain
//! - [`KnowledgeGraph`] - Nodes and relationships with per-property conflict resolution
//!
//! ## Wire format
//!
//! Every type implements [`WireCrdt`](wire::WireCrdt): a JSON object tagged
//! with `type`, carrying `nodeId` and `vectorClock`. [`AnyCrdt`] and
//! [`CrdtRegistry`] reconstruct a CRDT from the tag alone.
//!
//! ## The `Crdt` Trait
//!
//! All types implement the [`Crdt`] trait, which provides the [`Crdt::merge`]
//! method, and the [`Replicated`] trait, which exposes the owning replica and
//! its [`VectorClock`](clock::VectorClock).

#![warn(missing_docs)]

mod crdt;
mod error;
mod factory;
mod gcounter;
mod graph;
mod lww_register;
mod mv_register;
mod or_map;
mod or_set;
mod pncounter;

pub mod clock;
pub mod prelude;
pub mod wire;

pub use crdt::{Crdt, Replicated};
pub use error::CrdtError;
pub use factory::{AnyCrdt, CrdtRegistry, Decoder};
pub use gcounter::GCounter;
pub use graph::{
    KnowledgeGraph, Node, Properties, PropertyMap, Relationship, FROM_NODE, RELATIONSHIP_TYPE,
    TO_NODE,
};
pub use lww_register::LWWRegister;
pub use mv_register::{MVRegister, MvEntry};
pub use or_map::ORMap;
pub use or_set::ORSet;
pub use pncounter::PNCounter;
