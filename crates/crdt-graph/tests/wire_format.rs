//! Wire-format tests: tags, field names, round trips and decode failures.

use crdt_graph::prelude::*;
use crdt_graph::wire::type_tag;
use crdt_graph::CrdtRegistry;
use serde_json::{json, Value};

fn populated() -> Vec<AnyCrdt> {
    let mut gc = GCounter::new("a");
    gc.increment_by(7).unwrap();

    let mut pn = PNCounter::new("a");
    pn.increment(3).unwrap();
    pn.decrement(5).unwrap();

    let mut set = ORSet::new("a");
    set.add("x".to_string());
    set.add("y".to_string());
    set.remove(&"y".to_string());

    let mut lww = LWWRegister::new("a", json!({"k": [1, 2]}));
    lww.assign(json!("final"));

    let mut mv_a = MVRegister::new("a");
    mv_a.assign(json!(1));
    let mut mv_b = MVRegister::new("b");
    mv_b.assign(json!(2));
    mv_a.merge(&mv_b);

    let mut map: ORMap<String, AnyCrdt> = ORMap::new("a");
    map.set("count".into(), gc.clone().into());
    map.set("gone".into(), pn.clone().into());
    map.delete(&"gone".to_string()).unwrap();

    let mut graph = KnowledgeGraph::new("a");
    graph.add_node("n1", Properties::from([("name".into(), json!("Alice"))]))
        .unwrap();
    graph.add_node("n2", Properties::new()).unwrap();
    graph
        .add_relationship("r1", "n1", "n2", "knows", Properties::new())
        .unwrap();

    vec![
        gc.into(),
        pn.into(),
        set.into(),
        lww.into(),
        mv_a.into(),
        map.into(),
        graph.into(),
    ]
}

#[test]
fn every_payload_carries_common_fields() {
    for crdt in populated() {
        let wire = crdt.to_wire().unwrap();
        assert_eq!(type_tag(&wire).unwrap(), crdt.type_name());
        assert_eq!(wire["nodeId"], "a");
        assert!(wire["vectorClock"].is_array(), "{wire}");
    }
}

#[test]
fn round_trip_is_observationally_identical() {
    for crdt in populated() {
        let json = crdt.to_json().unwrap();
        let back = AnyCrdt::from_json(&json).unwrap();
        assert_eq!(back, crdt);

        let mut merged = crdt.clone();
        merged.try_merge(&back).unwrap();
        assert_eq!(merged, crdt);
    }
}

#[test]
fn round_trip_preserves_reads() {
    let mut set = ORSet::new("a");
    set.add(json!(1).to_string());
    let back = ORSet::<String>::from_json(&set.to_json().unwrap()).unwrap();
    assert_eq!(back.values(), set.values());

    let mut pn = PNCounter::new("a");
    pn.decrement(9).unwrap();
    assert_eq!(PNCounter::from_json(&pn.to_json().unwrap()).unwrap().value(), -9);
}

#[test]
fn gcounter_wire_shape() {
    let mut c = GCounter::new("a");
    c.increment_by(2).unwrap();
    let wire = c.to_wire().unwrap();
    assert_eq!(wire["type"], "GCounter");
    assert_eq!(wire["counters"], json!([["a", 2]]));
}

#[test]
fn orset_wire_shape() {
    let mut s = ORSet::new("a");
    s.add("x".to_string());
    s.remove(&"x".to_string());
    let wire = s.to_wire().unwrap();
    assert_eq!(wire["type"], "ORSet");

    let elements = wire["elements"].as_array().unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0][0], "x");
    let tag = elements[0][1][0].as_str().unwrap();
    assert!(tag.starts_with("a:"), "{tag}");
    assert_eq!(tag.split(':').count(), 3);
    assert_eq!(wire["removed"], json!([tag]));
}

#[test]
fn lww_wire_shape() {
    let r = LWWRegister::with_timestamp("a", json!("red"), 3);
    let wire = r.to_wire().unwrap();
    assert_eq!(wire["value"], "red");
    assert_eq!(wire["timestamp"], 3);
    assert_eq!(wire["writerNodeId"], "a");
}

#[test]
fn graph_wire_shape() {
    let mut g = KnowledgeGraph::new("a");
    g.add_node("n1", Properties::new()).unwrap();
    let wire = g.to_wire().unwrap();
    assert_eq!(wire["type"], "KnowledgeGraphCRDT");
    for field in ["nodes", "relationships"] {
        assert_eq!(wire[field]["type"], "ORMap", "{field}");
    }
    assert_eq!(wire["metadata"]["value"], Value::Null);
}

#[test]
fn wrong_tag_is_type_mismatch() {
    let json = GCounter::new("a").to_json().unwrap();
    let err = ORSet::<String>::from_json(&json).unwrap_err();
    assert_eq!(
        err,
        CrdtError::TypeMismatch {
            expected: "ORSet".into(),
            found: "GCounter".into(),
        }
    );
}

#[test]
fn malformed_payloads_are_rejected() {
    for bad in [
        "not json",
        "42",
        r#"{"nodeId":"a"}"#,
        r#"{"type":"LWWRegister","nodeId":"a","vectorClock":[]}"#,
        r#"{"type":"GCounter","nodeId":"a","vectorClock":{"a":1},"counters":[]}"#,
    ] {
        let err = AnyCrdt::from_json(bad).unwrap_err();
        assert!(matches!(err, CrdtError::MalformedWireData(_)), "{bad}: {err}");
    }
}

#[test]
fn global_registry_lists_builtins() {
    let names = CrdtRegistry::global().type_names();
    for tag in [
        "GCounter",
        "KnowledgeGraphCRDT",
        "LWWRegister",
        "MVRegister",
        "ORMap",
        "ORSet",
        "PNCounter",
    ] {
        assert!(names.iter().any(|n| n == tag), "{tag}");
    }
}
