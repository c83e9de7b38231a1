//! Integration tests verifying CRDT convergence properties.
//!
//! For any CRDT, merging replicas in any order must produce the same result.

use crdt_graph::prelude::*;
use serde_json::json;

#[test]
fn orset_concurrent_adds_collapse() {
    let mut a = ORSet::new("a");
    let mut b = ORSet::new("b");
    a.add("x");
    b.add("x");

    a.merge(&b);
    b.merge(&a);

    for s in [&a, &b] {
        assert!(s.contains(&"x"));
        assert_eq!(s.values(), vec![&"x"]);
        assert_eq!(s.len(), 1);
    }
}

#[test]
fn orset_unobserved_add_survives_remove() {
    let mut a = ORSet::new("a");
    let mut b = ORSet::new("b");

    a.add("x");
    a.remove(&"x");
    b.add("x"); // never saw a's add

    a.merge(&b);
    b.merge(&a);

    assert!(a.contains(&"x"));
    assert!(b.contains(&"x"));
    assert_eq!(a.values(), b.values());
}

#[test]
fn orset_remove_of_unknown_element_is_noop() {
    let mut s = ORSet::new("a");
    s.add("y");
    let before = s.clone();
    assert!(!s.remove(&"x"));
    assert_eq!(s, before);
}

#[test]
fn lww_equal_timestamps_resolve_by_writer() {
    let mut a = LWWRegister::with_timestamp("a", "red", 3);
    let mut b = LWWRegister::with_timestamp("b", "blue", 3);

    a.merge(&b);
    b.merge(&a);

    assert_eq!(*a.get(), "blue");
    assert_eq!(*b.get(), "blue");
    assert_eq!(a.writer(), "b");
}

#[test]
fn lww_later_local_write_supersedes_observed_state() {
    let mut a = LWWRegister::with_timestamp("a", 1, 10);
    let mut b = LWWRegister::new("b", 2);
    b.merge(&a);
    assert_eq!(*b.get(), 1);

    b.assign(3);
    assert!(b.timestamp() > 10);
    a.merge(&b);
    assert_eq!(*a.get(), 3);
}

#[test]
fn gcounter_bidirectional_merge() {
    let mut a = GCounter::new("a");
    let mut b = GCounter::new("b");
    a.increment_by(5).unwrap();
    b.increment_by(3).unwrap();

    a.merge(&b);
    b.merge(&a);

    assert_eq!(a.value(), 8);
    assert_eq!(b.value(), 8);
}

#[test]
fn gcounter_three_way_convergence() {
    let mut a = GCounter::new("a");
    let mut b = GCounter::new("b");
    let mut c = GCounter::new("c");

    a.increment_by(10).unwrap();
    b.increment_by(20).unwrap();
    c.increment_by(30).unwrap();

    // Merge in different orders
    let mut order1 = a.clone();
    order1.merge(&b);
    order1.merge(&c);

    let mut order2 = c.clone();
    order2.merge(&a);
    order2.merge(&b);

    let mut order3 = b.clone();
    order3.merge(&c);
    order3.merge(&a);

    assert_eq!(order1.value(), 60);
    assert_eq!(order2.value(), 60);
    assert_eq!(order3.value(), 60);
}

#[test]
fn gcounter_negative_increment_is_rejected() {
    let mut c = GCounter::new("a");
    c.increment_by(2).unwrap();

    let err = c.increment_by(-1).unwrap_err();
    assert!(matches!(err, CrdtError::InvalidArgument(_)));
    assert_eq!(c.value(), 2);
}

#[test]
fn pncounter_convergence_with_concurrent_ops() {
    let mut a = PNCounter::new("a");
    let mut b = PNCounter::new("b");

    // Concurrent operations
    a.increment(2).unwrap();
    a.decrement(1).unwrap();

    b.decrement(2).unwrap();
    b.increment(1).unwrap();

    let mut ab = a.clone();
    ab.merge(&b);

    let mut ba = b.clone();
    ba.merge(&a);

    assert_eq!(ab.value(), ba.value());
    assert_eq!(ab.value(), 0); // (2-1) + (1-2) = 0
}

#[test]
fn mvregister_keeps_concurrent_writes_until_overwritten() {
    let mut a = MVRegister::new("a");
    let mut b = MVRegister::new("b");
    a.assign("left");
    b.assign("right");

    a.merge(&b);
    b.merge(&a);
    assert!(a.is_conflicted());
    let mut seen = a.values();
    seen.sort();
    assert_eq!(seen, vec![&"left", &"right"]);
    assert_eq!(a.values().len(), b.values().len());

    // A write after observing both replaces them everywhere.
    a.assign("resolved");
    b.merge(&a);
    assert_eq!(b.values(), vec![&"resolved"]);
    assert!(!b.is_conflicted());
}

#[test]
fn graph_update_before_and_after_merge() {
    let mut a = KnowledgeGraph::new("A");
    let mut b = KnowledgeGraph::new("B");

    a.add_node("n1", Properties::from([("name".into(), json!("Alice"))]))
        .unwrap();

    let err = b.update_node_property("n1", "age", json!(30)).unwrap_err();
    assert!(matches!(err, CrdtError::NotFound(_)));

    b.merge(&a);
    b.update_node_property("n1", "age", json!(30)).unwrap();
    a.merge(&b);

    let node = a.get_node("n1").unwrap();
    assert_eq!(node.properties["name"], json!("Alice"));
    assert_eq!(node.properties["age"], json!(30));
    assert_eq!(a.get_all_nodes(), b.get_all_nodes());
}

#[test]
fn graph_readded_node_supersedes_retained_state() {
    let mut a = KnowledgeGraph::new("A");
    let mut b = KnowledgeGraph::new("B");

    a.add_node(
        "n1",
        Properties::from([("name".into(), json!("Alice")), ("age".into(), json!(30))]),
    )
    .unwrap();
    a.update_node_property("n1", "name", json!("Bob")).unwrap();
    a.update_node_property("n1", "name", json!("Bob2")).unwrap();
    b.merge(&a);

    a.remove_node("n1").unwrap();
    a.add_node("n1", Properties::from([("name".into(), json!("Carol"))]))
        .unwrap();
    a.merge(&b);
    b.merge(&a);

    for g in [&a, &b] {
        let node = g.get_node("n1").unwrap();
        assert_eq!(node.properties, Properties::from([("name".into(), json!("Carol"))]));
    }
}

#[test]
fn graph_replaced_node_keeps_local_write_after_merge() {
    let mut a = KnowledgeGraph::new("A");
    let mut b = KnowledgeGraph::new("B");

    a.add_node("n1", Properties::from([("name".into(), json!("Alice"))]))
        .unwrap();
    b.merge(&a);
    b.update_node_property("n1", "name", json!("Bob")).unwrap();
    b.update_node_property("n1", "team", json!("infra")).unwrap();
    a.merge(&b);

    a.add_node("n1", Properties::from([("name".into(), json!("Carol"))]))
        .unwrap();
    a.merge(&b);
    b.merge(&a);

    assert_eq!(a.get_all_nodes(), b.get_all_nodes());
    let node = a.get_node("n1").unwrap();
    assert_eq!(node.properties["name"], json!("Carol"));
    assert!(!node.properties.contains_key("team"));
}

#[test]
fn graph_readded_relationship_drops_old_properties() {
    let mut a = KnowledgeGraph::new("A");
    a.add_node("x", Properties::new()).unwrap();
    a.add_node("y", Properties::new()).unwrap();
    a.add_relationship("r1", "x", "y", "knows", Properties::from([("since".into(), json!(2020))]))
        .unwrap();
    let mut b = KnowledgeGraph::new("B");
    b.merge(&a);

    a.remove_relationship("r1").unwrap();
    a.add_relationship("r1", "y", "x", "trusts", Properties::new())
        .unwrap();
    b.merge(&a);
    a.merge(&b);

    for g in [&a, &b] {
        let rel = g.get_relationship("r1").unwrap();
        assert_eq!((rel.from_node.as_str(), rel.to_node.as_str()), ("y", "x"));
        assert_eq!(rel.rel_type, "trusts");
        assert!(rel.properties.is_empty());
    }
}

#[test]
fn graph_three_agents_converge() {
    let mut a = KnowledgeGraph::new("a");
    let mut b = KnowledgeGraph::new("b");
    let mut c = KnowledgeGraph::new("c");

    a.add_node("rust", Properties::from([("kind".into(), json!("language"))]))
        .unwrap();
    b.add_node("tokio", Properties::from([("kind".into(), json!("runtime"))]))
        .unwrap();
    c.merge(&a);
    c.merge(&b);
    c.add_relationship("r1", "tokio", "rust", "written_in", Properties::new())
        .unwrap();
    a.update_node_property("rust", "edition", json!(2021)).unwrap();
    b.update_node_property("tokio", "stars", json!(25000)).unwrap();

    let mut order1 = a.clone();
    order1.merge(&b);
    order1.merge(&c);

    let mut order2 = c.clone();
    order2.merge(&b);
    order2.merge(&a);

    assert_eq!(order1.get_all_nodes(), order2.get_all_nodes());
    assert_eq!(order1.get_all_relationships(), order2.get_all_relationships());
    assert_eq!(order1.relationship_count(), 1);
    let tokio = order1.get_node("tokio").unwrap();
    assert_eq!(tokio.properties["stars"], json!(25000));
}

#[test]
fn merge_with_fresh_replica_is_noop() {
    let mut g = KnowledgeGraph::new("a");
    g.add_node("n", Properties::new()).unwrap();
    let before = g.clone();
    g.merge(&KnowledgeGraph::new("z"));
    assert_eq!(g, before);

    let mut c = PNCounter::new("a");
    c.decrement(4).unwrap();
    let before = c.clone();
    c.merge(&PNCounter::new("z"));
    assert_eq!(c, before);
}
