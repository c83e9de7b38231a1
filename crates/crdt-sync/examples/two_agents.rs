//! Example: two agents gossiping a knowledge graph through in-memory transports.
//!
//! Run with `RUST_LOG=crdt_sync=debug` to watch the sync loop.

use std::time::Duration;

use crdt_graph::prelude::*;
use crdt_sync::{MemoryTransport, SyncConfig, SyncHandle, SyncManager};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn relay(from: &MemoryTransport, to: &SyncHandle) {
    for msg in from.take() {
        if let Err(err) = to.on_remote_update(&msg.crdt_name, &msg.payload) {
            eprintln!("dropped update for {}: {err}", msg.crdt_name);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = SyncConfig::from_toml_str(
        r#"
        debounce_ms = 50
        sync_interval_ms = 1000
        "#,
    )?;

    let wire_a = MemoryTransport::new();
    let wire_b = MemoryTransport::new();
    let manager_a = SyncManager::new(config.clone(), wire_a.clone());
    let manager_b = SyncManager::new(config, wire_b.clone());

    let graph_a = manager_a.register("graph", KnowledgeGraph::new("agent-a"))?;
    let graph_b = manager_b.register("graph", KnowledgeGraph::new("agent-b"))?;
    let (handle_a, handle_b) = (manager_a.handle(), manager_b.handle());
    let tasks = [manager_a.spawn(), manager_b.spawn()];

    graph_a.mutate(|g| {
        g.add_node("paper-1", Properties::from([("title".into(), json!("CRDTs"))]))?;
        g.add_node("author-1", Properties::from([("name".into(), json!("Shapiro"))]))?;
        g.add_relationship("r1", "author-1", "paper-1", "wrote", Properties::new())
    })?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    relay(&wire_a, &handle_b);

    graph_b.mutate(|g| g.update_node_property("paper-1", "year", json!(2011)))?;
    graph_a.mutate(|g| g.update_node_property("paper-1", "venue", json!("SSS")))?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    relay(&wire_b, &handle_a);
    relay(&wire_a, &handle_b);

    for (agent, graph) in [("a", &graph_a), ("b", &graph_b)] {
        let paper = graph.read(|g| g.get_node("paper-1"));
        println!("agent {agent}: {:?}", paper.map(|n| n.properties));
    }
    println!("stats a: {:?}", handle_a.stats());
    println!("stats b: {:?}", handle_b.stats());

    handle_a.shutdown().await?;
    handle_b.shutdown().await?;
    for task in tasks {
        task.await?;
    }
    Ok(())
}
