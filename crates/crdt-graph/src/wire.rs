//! Wire format shared by every CRDT.
//!
//! Each CRDT serializes to a JSON object tagged with its type name:
//!
//! ```text
//! { "type": "<CRDT type name>", "nodeId": "<replica>", "vectorClock": [[replica, counter], ...], ... }
//! ```
//!
//! Maps are written as arrays of `[key, value]` pairs so that keys may be any
//! JSON value and ordering is deterministic.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::{Crdt, CrdtError};

/// A CRDT with a tagged JSON wire form.
///
/// # Example
///
/// ```
/// use crdt_graph::prelude::*;
///
/// let mut counter = GCounter::new("node-a");
/// counter.increment_by(4).unwrap();
///
/// let json = counter.to_json().unwrap();
/// let copy = GCounter::from_json(&json).unwrap();
/// assert_eq!(copy.value(), 4);
///
/// // The `type` tag is checked before decoding.
/// assert!(matches!(
///     PNCounter::from_json(&json),
///     Err(CrdtError::TypeMismatch { .. })
/// ));
/// ```
pub trait WireCrdt: Crdt + Serialize + DeserializeOwned {
    /// The `type` tag written to and expected in the wire form.
    const TYPE_NAME: &'static str;

    /// Serialize into the tagged wire structure.
    fn to_wire(&self) -> Result<Value, CrdtError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Serialize into a JSON string.
    fn to_json(&self) -> Result<String, CrdtError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reconstruct an instance from its wire structure.
    fn from_wire(value: Value) -> Result<Self, CrdtError> {
        expect_type(&value, Self::TYPE_NAME)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Reconstruct an instance from a JSON string.
    fn from_json(json: &str) -> Result<Self, CrdtError> {
        Self::from_wire(serde_json::from_str(json)?)
    }
}

/// Read the `type` tag of a wire payload.
pub fn type_tag(value: &Value) -> Result<&str, CrdtError> {
    value
        .as_object()
        .ok_or_else(|| CrdtError::MalformedWireData("payload is not an object".into()))?
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CrdtError::MalformedWireData("missing `type` tag".into()))
}

fn expect_type(value: &Value, expected: &str) -> Result<(), CrdtError> {
    let found = type_tag(value)?;
    if found == expected {
        Ok(())
    } else {
        Err(CrdtError::type_mismatch(expected, found))
    }
}

/// `#[serde(with = "pairs")]` for `BTreeMap`s written as `[[key, value], ...]`.
pub(crate) mod pairs {
    use std::collections::BTreeMap;

    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, K, V>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        K: Serialize,
        V: Serialize,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, D, K, V>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        D: Deserializer<'de>,
        K: DeserializeOwned + Ord,
        V: DeserializeOwned,
    {
        let entries: Vec<(K, V)> = Vec::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}
