//! A replicated knowledge graph built from [`ORMap`]s and [`LWWRegister`]s.
//!
//! Nodes and relationships are both stored as property maps
//! (`ORMap<String, LWWRegister<Value>>`). Conflicts are resolved per
//! property: concurrent edits to different properties of the same node both
//! survive, concurrent edits to the same property resolve last-writer-wins.
//!
//! Removing a node tombstones every relationship that references it on the
//! local replica. A relationship added concurrently on another replica can
//! still point at the removed node after a merge; such dangling
//! relationships are hidden from relationship reads and reported by
//! [`KnowledgeGraph::dangling_relationships`].
//!
//! # Example
//!
//! ```
//! use crdt_graph::prelude::*;
//! use serde_json::json;
//!
//! let mut a = KnowledgeGraph::new("agent-a");
//! a.add_node("n1", Properties::from([("name".into(), json!("Alice"))])).unwrap();
//!
//! let mut b = KnowledgeGraph::new("agent-b");
//! assert!(b.update_node_property("n1", "age", json!(30)).is_err());
//!
//! b.merge(&a);
//! b.update_node_property("n1", "age", json!(30)).unwrap();
//! a.merge(&b);
//!
//! let node = a.get_node("n1").unwrap();
//! assert_eq!(node.properties["name"], json!("Alice"));
//! assert_eq!(node.properties["age"], json!(30));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::clock::VectorClock;
use crate::wire::WireCrdt;
use crate::{Crdt, CrdtError, LWWRegister, ORMap, Replicated};

/// Plain property values keyed by property name.
pub type Properties = BTreeMap<String, Value>;

/// The CRDT form of an entity: one LWW register per property.
pub type PropertyMap = ORMap<String, LWWRegister<Value>>;

/// Relationship property holding the source node id.
pub const FROM_NODE: &str = "fromNode";
/// Relationship property holding the target node id.
pub const TO_NODE: &str = "toNode";
/// Relationship property holding the relationship type.
pub const RELATIONSHIP_TYPE: &str = "type";

/// A snapshot of a node as seen by readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    /// Node id.
    pub id: String,
    /// Current property values.
    pub properties: Properties,
}

/// A snapshot of a relationship as seen by readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Relationship id.
    pub id: String,
    /// Source node id.
    pub from_node: String,
    /// Target node id.
    pub to_node: String,
    /// Relationship type, e.g. `"knows"`.
    pub rel_type: String,
    /// Properties other than the endpoints and type.
    pub properties: Properties,
}

/// A knowledge graph replicated across agents.
///
/// Wire form: `{ type: "KnowledgeGraphCRDT", nodeId, vectorClock, nodes, relationships, metadata }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "KnowledgeGraphCRDT", rename_all = "camelCase")]
pub struct KnowledgeGraph {
    node_id: String,
    vector_clock: VectorClock,
    nodes: ORMap<String, PropertyMap>,
    relationships: ORMap<String, PropertyMap>,
    metadata: LWWRegister<Value>,
}

impl KnowledgeGraph {
    /// Create an empty graph owned by `node_id`.
    pub fn new(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            nodes: ORMap::new(node_id.clone()),
            relationships: ORMap::new(node_id.clone()),
            metadata: LWWRegister::unset(node_id.clone(), Value::Null),
            vector_clock: VectorClock::new(),
            node_id,
        }
    }

    /// Add a node, replacing any node with the same id.
    pub fn add_node(&mut self, id: &str, properties: Properties) -> Result<(), CrdtError> {
        validate_id("node id", id)?;
        for name in properties.keys() {
            validate_property(name)?;
        }

        replace_entity(&mut self.nodes, &self.node_id, id, properties)?;
        self.vector_clock.tick(&self.node_id);
        debug!(replica = %self.node_id, node = id, "node added");
        Ok(())
    }

    /// Set one property of an existing node.
    ///
    /// Fails with [`CrdtError::NotFound`] if the node is absent.
    pub fn update_node_property(
        &mut self,
        node_id: &str,
        property: &str,
        value: Value,
    ) -> Result<(), CrdtError> {
        validate_property(property)?;
        let key = node_id.to_string();
        if !self.nodes.has(&key) {
            return Err(CrdtError::NotFound(format!("node `{node_id}`")));
        }

        let replica = self.node_id.clone();
        self.nodes
            .try_update(&key, |props| write_property(props, &replica, property, value))?;
        self.vector_clock.tick(&self.node_id);
        debug!(replica = %self.node_id, node = node_id, property, "node property updated");
        Ok(())
    }

    /// Remove a node and, locally, every relationship that references it.
    ///
    /// Fails with [`CrdtError::NotFound`] if the node is absent.
    pub fn remove_node(&mut self, node_id: &str) -> Result<(), CrdtError> {
        let key = node_id.to_string();
        if !self.nodes.has(&key) {
            return Err(CrdtError::NotFound(format!("node `{node_id}`")));
        }

        let attached: Vec<String> = self
            .relationships
            .entries()
            .filter(|(_, props)| {
                text_property(props, FROM_NODE) == Some(node_id)
                    || text_property(props, TO_NODE) == Some(node_id)
            })
            .map(|(id, _)| id.clone())
            .collect();

        self.nodes.delete(&key)?;
        for id in &attached {
            self.relationships.delete(id)?;
        }
        self.vector_clock.tick(&self.node_id);
        debug!(
            replica = %self.node_id,
            node = node_id,
            cascaded = attached.len(),
            "node removed"
        );
        Ok(())
    }

    /// Add a relationship between two present nodes.
    ///
    /// Fails with [`CrdtError::NotFound`] if either endpoint is absent, and
    /// with [`CrdtError::InvalidArgument`] for empty ids or when `properties`
    /// tries to set `fromNode`, `toNode` or `type`.
    pub fn add_relationship(
        &mut self,
        id: &str,
        from_node: &str,
        to_node: &str,
        rel_type: &str,
        properties: Properties,
    ) -> Result<(), CrdtError> {
        validate_id("relationship id", id)?;
        validate_id("relationship type", rel_type)?;
        for name in properties.keys() {
            validate_property(name)?;
            if is_reserved(name) {
                return Err(CrdtError::InvalidArgument(format!(
                    "`{name}` is set from the relationship arguments"
                )));
            }
        }
        for endpoint in [from_node, to_node] {
            if !self.has_node(endpoint) {
                return Err(CrdtError::NotFound(format!("node `{endpoint}`")));
            }
        }

        let mut all = properties;
        all.insert(FROM_NODE.into(), Value::from(from_node));
        all.insert(TO_NODE.into(), Value::from(to_node));
        all.insert(RELATIONSHIP_TYPE.into(), Value::from(rel_type));

        replace_entity(&mut self.relationships, &self.node_id, id, all)?;
        self.vector_clock.tick(&self.node_id);
        debug!(
            replica = %self.node_id,
            relationship = id,
            from = from_node,
            to = to_node,
            rel_type,
            "relationship added"
        );
        Ok(())
    }

    /// Set one property of an existing relationship.
    ///
    /// The endpoints identify the relationship and cannot be rewritten.
    pub fn update_relationship(
        &mut self,
        id: &str,
        property: &str,
        value: Value,
    ) -> Result<(), CrdtError> {
        validate_property(property)?;
        if property == FROM_NODE || property == TO_NODE {
            return Err(CrdtError::InvalidArgument(format!(
                "relationship endpoint `{property}` cannot be changed"
            )));
        }
        if property == RELATIONSHIP_TYPE && value.as_str().map_or(true, |t| t.trim().is_empty()) {
            return Err(CrdtError::InvalidArgument(
                "relationship type must be a non-empty string".into(),
            ));
        }
        let key = id.to_string();
        if !self.relationships.has(&key) {
            return Err(CrdtError::NotFound(format!("relationship `{id}`")));
        }

        let replica = self.node_id.clone();
        self.relationships
            .try_update(&key, |props| write_property(props, &replica, property, value))?;
        self.vector_clock.tick(&self.node_id);
        debug!(replica = %self.node_id, relationship = id, property, "relationship updated");
        Ok(())
    }

    /// Remove a relationship.
    ///
    /// Fails with [`CrdtError::NotFound`] if the relationship is absent.
    pub fn remove_relationship(&mut self, id: &str) -> Result<(), CrdtError> {
        self.relationships
            .delete(&id.to_string())
            .map_err(|_| CrdtError::NotFound(format!("relationship `{id}`")))?;
        self.vector_clock.tick(&self.node_id);
        debug!(replica = %self.node_id, relationship = id, "relationship removed");
        Ok(())
    }

    /// Replace the graph-level metadata value.
    pub fn set_metadata(&mut self, value: Value) {
        self.metadata.assign(value);
        self.vector_clock.tick(&self.node_id);
    }

    /// The graph-level metadata value (`null` until first set).
    #[must_use]
    pub fn metadata(&self) -> &Value {
        self.metadata.get()
    }

    /// Look up a node.
    #[must_use]
    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.nodes.get(&id.to_string()).map(|props| Node {
            id: id.to_string(),
            properties: read_properties(props),
        })
    }

    /// All present nodes, ordered by id.
    #[must_use]
    pub fn get_all_nodes(&self) -> Vec<Node> {
        self.nodes
            .entries()
            .map(|(id, props)| Node {
                id: id.clone(),
                properties: read_properties(props),
            })
            .collect()
    }

    /// Nodes whose `property` currently equals `value`.
    #[must_use]
    pub fn find_nodes(&self, property: &str, value: &Value) -> Vec<Node> {
        let key = property.to_string();
        self.nodes
            .entries()
            .filter(|(_, props)| props.get(&key).is_some_and(|r| r.get() == value))
            .map(|(id, props)| Node {
                id: id.clone(),
                properties: read_properties(props),
            })
            .collect()
    }

    /// Returns `true` if the node is present.
    #[must_use]
    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.has(&id.to_string())
    }

    /// Number of present nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.size()
    }

    /// Look up a relationship. Dangling relationships read as absent.
    #[must_use]
    pub fn get_relationship(&self, id: &str) -> Option<Relationship> {
        self.relationships
            .get(&id.to_string())
            .and_then(|props| relationship_view(id, props))
            .filter(|rel| self.is_attached(rel))
    }

    /// All relationships whose endpoints are both present, ordered by id.
    #[must_use]
    pub fn get_all_relationships(&self) -> Vec<Relationship> {
        self.relationship_views()
            .filter(|rel| self.is_attached(rel))
            .collect()
    }

    /// Relationships entering or leaving `node_id`.
    #[must_use]
    pub fn get_node_relationships(&self, node_id: &str) -> Vec<Relationship> {
        if !self.has_node(node_id) {
            return Vec::new();
        }
        self.relationship_views()
            .filter(|rel| rel.from_node == node_id || rel.to_node == node_id)
            .filter(|rel| self.is_attached(rel))
            .collect()
    }

    /// Number of relationships whose endpoints are both present.
    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.get_all_relationships().len()
    }

    /// Ids of present relationships that reference an absent node.
    ///
    /// These arise when one replica removes a node while another
    /// concurrently adds a relationship to it.
    #[must_use]
    pub fn dangling_relationships(&self) -> Vec<String> {
        self.relationship_views()
            .filter(|rel| !self.is_attached(rel))
            .map(|rel| rel.id)
            .collect()
    }

    fn relationship_views(&self) -> impl Iterator<Item = Relationship> + '_ {
        self.relationships
            .entries()
            .filter_map(|(id, props)| relationship_view(id, props))
    }

    fn is_attached(&self, rel: &Relationship) -> bool {
        self.has_node(&rel.from_node) && self.has_node(&rel.to_node)
    }
}

fn validate_id(what: &str, id: &str) -> Result<(), CrdtError> {
    if id.trim().is_empty() {
        return Err(CrdtError::InvalidArgument(format!("{what} must not be empty")));
    }
    Ok(())
}

fn validate_property(name: &str) -> Result<(), CrdtError> {
    if name.trim().is_empty() {
        return Err(CrdtError::InvalidArgument(
            "property name must not be empty".into(),
        ));
    }
    Ok(())
}

fn is_reserved(name: &str) -> bool {
    matches!(name, FROM_NODE | TO_NODE | RELATIONSHIP_TYPE)
}

/// Write `properties` as the whole state of entity `id`.
///
/// Builds on whatever the replica retains for `id`: properties it held
/// before are tombstoned, and each written property lands in its retained
/// register so the new timestamp exceeds every write observed for it.
fn replace_entity(
    entities: &mut ORMap<String, PropertyMap>,
    replica: &str,
    id: &str,
    properties: Properties,
) -> Result<(), CrdtError> {
    entities.upsert(
        id.to_string(),
        || ORMap::new(replica),
        |props| {
            let stale: Vec<String> = props.keys().cloned().collect();
            for name in &stale {
                props.delete(name)?;
            }
            for (name, value) in properties {
                write_property(props, replica, &name, value)?;
            }
            Ok(())
        },
    )
}

fn write_property(
    props: &mut PropertyMap,
    replica: &str,
    property: &str,
    value: Value,
) -> Result<(), CrdtError> {
    let key = property.to_string();
    if props.has(&key) {
        return props.update(&key, |register| register.assign(value));
    }
    props.upsert(
        key,
        || LWWRegister::unset(replica, Value::Null),
        |register| {
            register.assign(value);
            Ok(())
        },
    )
}

fn read_properties(props: &PropertyMap) -> Properties {
    props
        .entries()
        .map(|(name, register)| (name.clone(), register.get().clone()))
        .collect()
}

fn text_property<'a>(props: &'a PropertyMap, name: &str) -> Option<&'a str> {
    props.get(&name.to_string()).and_then(|r| r.get().as_str())
}

fn relationship_view(id: &str, props: &PropertyMap) -> Option<Relationship> {
    let from_node = text_property(props, FROM_NODE)?.to_string();
    let to_node = text_property(props, TO_NODE)?.to_string();
    let rel_type = text_property(props, RELATIONSHIP_TYPE)?.to_string();
    let properties = props
        .entries()
        .filter(|(name, _)| !is_reserved(name))
        .map(|(name, register)| (name.clone(), register.get().clone()))
        .collect();
    Some(Relationship {
        id: id.to_string(),
        from_node,
        to_node,
        rel_type,
        properties,
    })
}

impl Crdt for KnowledgeGraph {
    fn merge(&mut self, other: &Self) {
        self.nodes.merge(&other.nodes);
        self.relationships.merge(&other.relationships);
        self.metadata.merge(&other.metadata);
        self.vector_clock.update_from(&other.vector_clock);
        debug!(
            replica = %self.node_id,
            from = %other.node_id,
            nodes = self.nodes.size(),
            relationships = self.relationships.size(),
            "graph merged"
        );
    }
}

impl Replicated for KnowledgeGraph {
    fn replica_id(&self) -> &str {
        &self.node_id
    }

    fn vector_clock(&self) -> &VectorClock {
        &self.vector_clock
    }

    fn bind_replica(&mut self, replica: &str) {
        self.node_id = replica.to_string();
        self.nodes.bind_replica(replica);
        self.relationships.bind_replica(replica);
        self.metadata.bind_replica(replica);
    }
}

impl WireCrdt for KnowledgeGraph {
    const TYPE_NAME: &'static str = "KnowledgeGraphCRDT";
}
