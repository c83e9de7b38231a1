//! Example: two research agents building a shared knowledge graph offline.

use crdt_graph::prelude::*;
use serde_json::json;

fn main() -> Result<(), CrdtError> {
    println!("=== Shared Knowledge Graph ===\n");

    let mut scout = KnowledgeGraph::new("scout");
    let mut analyst = KnowledgeGraph::new("analyst");

    // Scout discovers two entities and how they relate
    scout.add_node(
        "rust",
        Properties::from([("kind".into(), json!("language"))]),
    )?;
    scout.add_node(
        "tokio",
        Properties::from([("kind".into(), json!("runtime"))]),
    )?;
    scout.add_relationship("r1", "tokio", "rust", "written_in", Properties::new())?;
    println!("Scout knows {} nodes", scout.node_count());

    // Analyst cannot annotate what it has not seen yet
    if let Err(err) = analyst.update_node_property("tokio", "stars", json!(25_000)) {
        println!("Analyst before sync: {err}");
    }

    // Gossip scout -> analyst
    analyst.merge(&scout);
    println!("Analyst after sync: {} nodes", analyst.node_count());

    // Both edit concurrently
    analyst.update_node_property("tokio", "stars", json!(25_000))?;
    scout.update_node_property("tokio", "kind", json!("async runtime"))?;
    analyst.update_node_property("tokio", "kind", json!("executor"))?;

    // Gossip both ways
    scout.merge(&analyst);
    analyst.merge(&scout);

    println!("\n--- After bidirectional sync ---");
    for node in scout.get_all_nodes() {
        println!("{}: {}", node.id, json!(node.properties));
    }
    for rel in scout.get_all_relationships() {
        println!("{} -[{}]-> {}", rel.from_node, rel.rel_type, rel.to_node);
    }
    assert_eq!(scout.get_all_nodes(), analyst.get_all_nodes());

    // Wire form round trip, as a transport would see it
    let payload = scout.to_json()?;
    let restored = AnyCrdt::from_json(&payload)?;
    println!("\nPayload: {} bytes, type {}", payload.len(), restored.type_name());

    Ok(())
}
