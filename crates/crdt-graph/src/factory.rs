//! Reconstruct CRDTs from their wire form without knowing the type up front.
//!
//! [`AnyCrdt`] is the sum of every concrete CRDT this crate ships, and
//! [`CrdtRegistry`] maps a wire `type` tag to the decoder that builds it.
//! `AnyCrdt` deserializes through the global registry, so an
//! `ORMap<String, AnyCrdt>` reconstructs heterogeneous values purely from
//! their tags.
//!
//! # Example
//!
//! ```
//! use crdt_graph::prelude::*;
//!
//! let mut counter = PNCounter::new("node-a");
//! counter.decrement(2).unwrap();
//! let json = counter.to_json().unwrap();
//!
//! let any = AnyCrdt::from_json(&json).unwrap();
//! assert_eq!(any.type_name(), "PNCounter");
//! assert!(matches!(any, AnyCrdt::PNCounter(ref c) if c.value() == -2));
//! ```

use std::collections::BTreeMap;
use std::sync::OnceLock;

use parking_lot::RwLock;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

use crate::clock::VectorClock;
use crate::wire::{type_tag, WireCrdt};
use crate::{
    Crdt, CrdtError, GCounter, KnowledgeGraph, LWWRegister, MVRegister, ORMap, ORSet, PNCounter,
    Replicated,
};

/// Any CRDT with a registered wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyCrdt {
    /// A [`GCounter`].
    GCounter(GCounter),
    /// A [`PNCounter`].
    PNCounter(PNCounter),
    /// An [`ORSet`] of strings.
    ORSet(ORSet<String>),
    /// An [`LWWRegister`] holding arbitrary JSON.
    LWWRegister(LWWRegister<Value>),
    /// An [`MVRegister`] holding arbitrary JSON.
    MVRegister(MVRegister<Value>),
    /// An [`ORMap`] whose values may be any CRDT.
    ORMap(ORMap<String, AnyCrdt>),
    /// A [`KnowledgeGraph`].
    KnowledgeGraph(KnowledgeGraph),
}

macro_rules! each_variant {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            AnyCrdt::GCounter($inner) => $body,
            AnyCrdt::PNCounter($inner) => $body,
            AnyCrdt::ORSet($inner) => $body,
            AnyCrdt::LWWRegister($inner) => $body,
            AnyCrdt::MVRegister($inner) => $body,
            AnyCrdt::ORMap($inner) => $body,
            AnyCrdt::KnowledgeGraph($inner) => $body,
        }
    };
}

impl AnyCrdt {
    /// The wire `type` tag of the contained CRDT.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::GCounter(_) => GCounter::TYPE_NAME,
            Self::PNCounter(_) => PNCounter::TYPE_NAME,
            Self::ORSet(_) => <ORSet<String>>::TYPE_NAME,
            Self::LWWRegister(_) => <LWWRegister<Value>>::TYPE_NAME,
            Self::MVRegister(_) => <MVRegister<Value>>::TYPE_NAME,
            Self::ORMap(_) => <ORMap<String, AnyCrdt>>::TYPE_NAME,
            Self::KnowledgeGraph(_) => KnowledgeGraph::TYPE_NAME,
        }
    }

    /// Serialize the contained CRDT into its tagged wire structure.
    pub fn to_wire(&self) -> Result<Value, CrdtError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Serialize the contained CRDT into a JSON string.
    pub fn to_json(&self) -> Result<String, CrdtError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode any registered CRDT using the global registry.
    pub fn from_wire(value: Value) -> Result<Self, CrdtError> {
        CrdtRegistry::global().decode(value)
    }

    /// Decode any registered CRDT from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, CrdtError> {
        CrdtRegistry::global().decode_str(json)
    }
}

impl Crdt for AnyCrdt {
    /// Merge two values of the same concrete type.
    ///
    /// Mismatched types leave `self` unchanged; use
    /// [`try_merge`](Crdt::try_merge) to surface them as
    /// [`CrdtError::TypeMismatch`].
    fn merge(&mut self, other: &Self) {
        match (self, other) {
            (Self::GCounter(a), Self::GCounter(b)) => a.merge(b),
            (Self::PNCounter(a), Self::PNCounter(b)) => a.merge(b),
            (Self::ORSet(a), Self::ORSet(b)) => a.merge(b),
            (Self::LWWRegister(a), Self::LWWRegister(b)) => a.merge(b),
            (Self::MVRegister(a), Self::MVRegister(b)) => a.merge(b),
            (Self::ORMap(a), Self::ORMap(b)) => a.merge(b),
            (Self::KnowledgeGraph(a), Self::KnowledgeGraph(b)) => a.merge(b),
            (ours, theirs) => warn!(
                ours = ours.type_name(),
                theirs = theirs.type_name(),
                "ignoring merge of mismatched CRDT types"
            ),
        }
    }

    fn validate_merge(&self, other: &Self) -> Result<(), CrdtError> {
        match (self, other) {
            (Self::ORMap(a), Self::ORMap(b)) => a.validate_merge(b),
            (Self::KnowledgeGraph(a), Self::KnowledgeGraph(b)) => a.validate_merge(b),
            (ours, theirs) if ours.type_name() == theirs.type_name() => Ok(()),
            (ours, theirs) => Err(CrdtError::type_mismatch(
                ours.type_name(),
                theirs.type_name(),
            )),
        }
    }
}

impl Replicated for AnyCrdt {
    fn replica_id(&self) -> &str {
        each_variant!(self, inner => inner.replica_id())
    }

    fn vector_clock(&self) -> &VectorClock {
        each_variant!(self, inner => inner.vector_clock())
    }

    fn bind_replica(&mut self, replica: &str) {
        each_variant!(self, inner => inner.bind_replica(replica))
    }
}

impl Serialize for AnyCrdt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        each_variant!(self, inner => inner.serialize(serializer))
    }
}

impl<'de> Deserialize<'de> for AnyCrdt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        CrdtRegistry::global()
            .decode(value)
            .map_err(D::Error::custom)
    }
}

macro_rules! impl_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for AnyCrdt {
                fn from(crdt: $ty) -> Self {
                    Self::$variant(crdt)
                }
            }
        )*
    };
}

impl_from!(
    GCounter(GCounter),
    PNCounter(PNCounter),
    ORSet(ORSet<String>),
    LWWRegister(LWWRegister<Value>),
    MVRegister(MVRegister<Value>),
    ORMap(ORMap<String, AnyCrdt>),
    KnowledgeGraph(KnowledgeGraph),
);

/// Builds an [`AnyCrdt`] from a complete wire payload, `type` tag included.
pub type Decoder = fn(Value) -> Result<AnyCrdt, CrdtError>;

/// Maps wire `type` tags to decoders.
pub struct CrdtRegistry {
    decoders: RwLock<BTreeMap<String, Decoder>>,
}

impl CrdtRegistry {
    /// A registry holding the built-in CRDT types.
    pub fn new() -> Self {
        let builtins: [(&str, Decoder); 7] = [
            (GCounter::TYPE_NAME, |v| GCounter::from_wire(v).map(AnyCrdt::GCounter)),
            (PNCounter::TYPE_NAME, |v| PNCounter::from_wire(v).map(AnyCrdt::PNCounter)),
            (<ORSet<String>>::TYPE_NAME, |v| ORSet::from_wire(v).map(AnyCrdt::ORSet)),
            (<LWWRegister<Value>>::TYPE_NAME, |v| {
                LWWRegister::from_wire(v).map(AnyCrdt::LWWRegister)
            }),
            (<MVRegister<Value>>::TYPE_NAME, |v| {
                MVRegister::from_wire(v).map(AnyCrdt::MVRegister)
            }),
            (<ORMap<String, AnyCrdt>>::TYPE_NAME, |v| {
                ORMap::from_wire(v).map(AnyCrdt::ORMap)
            }),
            (KnowledgeGraph::TYPE_NAME, |v| {
                KnowledgeGraph::from_wire(v).map(AnyCrdt::KnowledgeGraph)
            }),
        ];
        let decoders = builtins
            .into_iter()
            .map(|(tag, decoder)| (tag.to_string(), decoder))
            .collect();
        Self {
            decoders: RwLock::new(decoders),
        }
    }

    /// The process-wide registry used by [`AnyCrdt`]'s `Deserialize` impl.
    pub fn global() -> &'static CrdtRegistry {
        static GLOBAL: OnceLock<CrdtRegistry> = OnceLock::new();
        GLOBAL.get_or_init(CrdtRegistry::new)
    }

    /// Register `decoder` for `tag`, replacing any existing decoder.
    ///
    /// The decoder receives the whole payload, so an alias must rewrite the
    /// `type` field before delegating to a built-in `from_wire`.
    pub fn register(&self, tag: impl Into<String>, decoder: Decoder) {
        self.decoders.write().insert(tag.into(), decoder);
    }

    /// Returns `true` if `tag` has a decoder.
    #[must_use]
    pub fn is_registered(&self, tag: &str) -> bool {
        self.decoders.read().contains_key(tag)
    }

    /// Registered tags in order.
    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        self.decoders.read().keys().cloned().collect()
    }

    /// Decode a wire payload by its `type` tag.
    ///
    /// An unregistered tag yields [`CrdtError::TypeMismatch`].
    pub fn decode(&self, value: Value) -> Result<AnyCrdt, CrdtError> {
        let tag = type_tag(&value)?;
        let decoder = self
            .decoders
            .read()
            .get(tag)
            .copied()
            .ok_or_else(|| CrdtError::type_mismatch("a registered CRDT type", tag))?;
        decoder(value)
    }

    /// Decode a JSON string by its `type` tag.
    pub fn decode_str(&self, json: &str) -> Result<AnyCrdt, CrdtError> {
        self.decode(serde_json::from_str(json)?)
    }
}

impl Default for CrdtRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CrdtRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrdtRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}
