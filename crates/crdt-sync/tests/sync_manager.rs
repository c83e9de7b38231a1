//! Timer-driven sync behaviour, run on a paused tokio clock.

use std::time::Duration;

use crdt_graph::prelude::*;
use crdt_sync::{MemoryTransport, SyncConfig, SyncError, SyncManager};
use serde_json::json;
use tokio::time::sleep;

fn manager() -> (SyncManager, MemoryTransport) {
    let transport = MemoryTransport::new();
    let manager = SyncManager::new(SyncConfig::default(), transport.clone());
    (manager, transport)
}

fn bump(counter: &mut GCounter) -> Result<(), CrdtError> {
    counter.increment();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn debounce_batches_bursts() {
    let (manager, transport) = manager();
    let hits = manager.register("hits", GCounter::new("a")).unwrap();
    let handle = manager.handle();
    let _task = manager.spawn();

    for _ in 0..5 {
        hits.mutate(bump).unwrap();
        sleep(Duration::from_millis(20)).await;
    }
    // each mutation pushed the flush back
    assert!(transport.is_empty());

    sleep(Duration::from_millis(150)).await;
    let sent = transport.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].crdt_name, "hits");
    assert_eq!(GCounter::from_json(&sent[0].payload).unwrap().value(), 5);
    assert_eq!(handle.stats().debounced_flushes, 1);
}

#[tokio::test(start_paused = true)]
async fn debounce_flushes_each_dirty_crdt_once() {
    let (manager, transport) = manager();
    let hits = manager.register("hits", GCounter::new("a")).unwrap();
    let tags = manager.register("tags", ORSet::<String>::new("a")).unwrap();
    let _untouched = manager.register("idle", PNCounter::new("a")).unwrap();
    let _task = manager.spawn();

    hits.mutate(bump).unwrap();
    tags.mutate(|s| {
        s.add("rust".into());
        Ok(())
    })
    .unwrap();
    hits.mutate(bump).unwrap();

    sleep(Duration::from_millis(200)).await;
    let names: Vec<String> = transport.take().into_iter().map(|b| b.crdt_name).collect();
    assert_eq!(names, vec!["hits", "tags"]);
}

#[tokio::test(start_paused = true)]
async fn failed_mutation_is_not_broadcast() {
    let (manager, transport) = manager();
    let hits = manager.register("hits", GCounter::new("a")).unwrap();
    let _task = manager.spawn();

    let err = hits.mutate(|c| c.increment_by(-1)).unwrap_err();
    assert!(matches!(err, CrdtError::InvalidArgument(_)));
    assert_eq!(hits.read(GCounter::value), 0);

    sleep(Duration::from_millis(500)).await;
    assert!(transport.is_empty());
}

#[tokio::test(start_paused = true)]
async fn periodic_sync_rebroadcasts_everything() {
    let (manager, transport) = manager();
    manager.register("hits", GCounter::new("a")).unwrap();
    manager.register("graph", KnowledgeGraph::new("a")).unwrap();
    let handle = manager.handle();
    let _task = manager.spawn();

    sleep(Duration::from_millis(4_900)).await;
    assert!(transport.is_empty());

    sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.len(), 2);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.len(), 4);
    assert_eq!(handle.stats().periodic_syncs, 2);
}

#[tokio::test(start_paused = true)]
async fn transport_failures_are_retried_by_periodic_sync() {
    let (manager, transport) = manager();
    let hits = manager.register("hits", GCounter::new("a")).unwrap();
    let handle = manager.handle();
    let _task = manager.spawn();

    transport.fail_next(1);
    hits.mutate(bump).unwrap();
    sleep(Duration::from_millis(200)).await;
    assert!(transport.is_empty());
    assert_eq!(handle.stats().transport_failures, 1);

    sleep(Duration::from_secs(5)).await;
    let sent = transport.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(GCounter::from_json(&sent[0].payload).unwrap().value(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_pending_changes() {
    let (manager, transport) = manager();
    let hits = manager.register("hits", GCounter::new("a")).unwrap();
    let handle = manager.handle();
    let task = manager.spawn();

    hits.mutate(bump).unwrap();
    handle.shutdown().await.unwrap();
    task.await.unwrap();

    assert_eq!(transport.len(), 1);
    assert!(matches!(handle.shutdown().await, Err(SyncError::Stopped)));

    // the replica stays usable locally
    hits.mutate(bump).unwrap();
    assert_eq!(hits.read(GCounter::value), 2);
}

#[tokio::test(start_paused = true)]
async fn flush_skips_the_debounce() {
    let (manager, transport) = manager();
    let hits = manager.register("hits", GCounter::new("a")).unwrap();
    let handle = manager.handle();
    let _task = manager.spawn();

    hits.mutate(bump).unwrap();
    handle.flush().await.unwrap();
    assert_eq!(transport.len(), 1);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(transport.len(), 1);
}

#[tokio::test]
async fn remote_updates_merge_in_any_order() {
    let (manager, transport) = manager();
    let hits = manager.register("hits", GCounter::new("local")).unwrap();
    let handle = manager.handle();

    let mut b = GCounter::new("b");
    b.increment_by(3).unwrap();
    let mut c = GCounter::new("c");
    c.increment_by(4).unwrap();
    let (b, c) = (b.to_json().unwrap(), c.to_json().unwrap());

    handle.on_remote_update("hits", &c).unwrap();
    handle.on_remote_update("hits", &b).unwrap();
    handle.on_remote_update("hits", &c).unwrap();

    assert_eq!(hits.read(GCounter::value), 7);
    assert_eq!(handle.stats().remote_applied, 3);
    // remote state is not echoed back
    assert!(transport.is_empty());
}

#[tokio::test]
async fn remote_update_failures_leave_state_untouched() {
    let (manager, _transport) = manager();
    let hits = manager.register("hits", GCounter::new("local")).unwrap();
    hits.mutate(bump).unwrap();
    let handle = manager.handle();
    let before = hits.snapshot();

    let err = handle.on_remote_update("missing", "{}").unwrap_err();
    assert!(matches!(err, SyncError::UnknownCrdt(name) if name == "missing"));

    let err = handle.on_remote_update("hits", "{\"type\":\"GCounter\"}").unwrap_err();
    assert!(matches!(err, SyncError::Crdt(CrdtError::MalformedWireData(_))));

    let wrong = PNCounter::new("b").to_json().unwrap();
    let err = handle.on_remote_update("hits", &wrong).unwrap_err();
    assert!(matches!(err, SyncError::Crdt(CrdtError::TypeMismatch { .. })));

    assert_eq!(hits.snapshot(), before);
    assert_eq!(handle.stats().remote_rejected, 3);
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let (manager, _transport) = manager();
    manager.register("hits", GCounter::new("a")).unwrap();
    let err = manager.register("hits", PNCounter::new("a")).unwrap_err();
    assert!(matches!(err, SyncError::AlreadyRegistered(_)));
    assert_eq!(manager.handle().crdt_names(), vec!["hits"]);
}

#[tokio::test(start_paused = true)]
async fn two_agents_converge_through_relay() {
    let (manager_a, wire_a) = manager();
    let (manager_b, wire_b) = manager();
    let graph_a = manager_a.register("graph", KnowledgeGraph::new("a")).unwrap();
    let graph_b = manager_b.register("graph", KnowledgeGraph::new("b")).unwrap();
    let (handle_a, handle_b) = (manager_a.handle(), manager_b.handle());
    let _tasks = (manager_a.spawn(), manager_b.spawn());

    graph_a
        .mutate(|g| g.add_node("n1", Properties::from([("name".into(), json!("Alice"))])))
        .unwrap();
    assert!(matches!(
        graph_b.mutate(|g| g.update_node_property("n1", "age", json!(30))),
        Err(CrdtError::NotFound(_))
    ));

    sleep(Duration::from_millis(200)).await;
    for msg in wire_a.take() {
        handle_b.on_remote_update(&msg.crdt_name, &msg.payload).unwrap();
    }
    graph_b
        .mutate(|g| g.update_node_property("n1", "age", json!(30)))
        .unwrap();

    sleep(Duration::from_millis(200)).await;
    for msg in wire_b.take() {
        handle_a.on_remote_update(&msg.crdt_name, &msg.payload).unwrap();
    }

    let node = graph_a.read(|g| g.get_node("n1")).unwrap();
    assert_eq!(node.properties["name"], json!("Alice"));
    assert_eq!(node.properties["age"], json!(30));
    assert_eq!(
        graph_a.read(KnowledgeGraph::get_all_nodes),
        graph_b.read(KnowledgeGraph::get_all_nodes)
    );
}
