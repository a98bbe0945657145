//! Cluster Tests
//!
//! End-to-end behaviour of a broker with several nodes, driven through the
//! client facade on the in-process transport.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use shardcache::cache::ManualClock;
use shardcache::protocol::ErrorCode;
use shardcache::{CacheError, Node, NodeId};

use common::{node_addr, wait_until, Cluster};

// =============================================================================
// Helper Functions
// =============================================================================

fn resident_everywhere(nodes: &[Arc<Node>], key: &str) -> bool {
    nodes.iter().all(|n| n.store().is_resident(key))
}

fn absent_everywhere(nodes: &[Arc<Node>], key: &str) -> bool {
    nodes.iter().all(|n| !n.store().is_resident(key))
}

// =============================================================================
// Replication
// =============================================================================

#[test]
fn test_set_reaches_every_node() {
    let cluster = Cluster::new();
    let nodes = vec![cluster.join("a"), cluster.join("b"), cluster.join("c")];
    let client = cluster.client();

    for i in 0..50 {
        client.set(&format!("key-{}", i), format!("value-{}", i)).unwrap();
    }

    for i in 0..50 {
        let key = format!("key-{}", i);
        for node in &nodes {
            assert_eq!(node.store().get(&key), Some(format!("value-{}", i).into_bytes()));
        }
    }
}

#[test]
fn test_remove_reaches_every_node() {
    let cluster = Cluster::new();
    let nodes = vec![cluster.join("a"), cluster.join("b"), cluster.join("c")];
    let client = cluster.client();

    client.set("k", "v").unwrap();
    assert!(resident_everywhere(&nodes, "k"));

    assert!(client.remove("k").unwrap());
    assert!(absent_everywhere(&nodes, "k"));
    assert_eq!(client.get("k").unwrap(), None);

    assert!(!client.remove("k").unwrap());
}

#[test]
fn test_writes_without_waiting_arrive_in_order() {
    let cluster = Cluster::new();
    let nodes = vec![cluster.join("a"), cluster.join("b"), cluster.join("c")];
    let client = cluster.client();

    for i in 0..20 {
        client.set_with("counter", i.to_string(), None, false).unwrap();
    }
    client.remove_with("gone", false).unwrap();

    let last = b"19".to_vec();
    assert!(wait_until(Duration::from_secs(2), || {
        nodes.iter().all(|n| n.store().get("counter") == Some(last.clone()))
    }));
}

#[test]
fn test_get_reads_owner() {
    let cluster = Cluster::new();
    cluster.join("a");
    cluster.join("b");
    let client = cluster.client();

    client.set("k1", "v1").unwrap();
    assert_eq!(client.get("k1").unwrap(), Some(b"v1".to_vec()));
    assert_eq!(client.get("missing").unwrap(), None);
}

// =============================================================================
// Membership Changes
// =============================================================================

#[test]
fn test_reads_survive_a_node_leaving() {
    let cluster = Cluster::new();
    let _a = cluster.join("a");
    let _b = cluster.join("b");
    let c = cluster.join("c");
    let client = cluster.client();

    client.set("k1", "v1").unwrap();

    c.unregister();
    cluster.connector.detach(&node_addr("c"));

    assert_eq!(
        cluster.broker.members(),
        vec![NodeId::from("a"), NodeId::from("b")]
    );
    assert_eq!(client.get("k1").unwrap(), Some(b"v1".to_vec()));

    let owner = cluster.broker.get_node_by_key("k1").unwrap();
    assert_ne!(owner.id().as_str(), "c");
}

#[test]
fn test_late_joiner_is_bootstrapped() {
    let cluster = Cluster::new();
    cluster.join("a");
    cluster.join("b");
    let client = cluster.client();

    client.set("k1", "v1").unwrap();
    client.set_with("k2", "v2", Some(3600), true).unwrap();

    let c = cluster.join("c");
    assert_eq!(c.store().get("k1"), Some(b"v1".to_vec()));
    assert_eq!(c.store().get("k2"), Some(b"v2".to_vec()));
    assert!(c.store().expires_at("k2").is_some());

    // And keeps receiving writes afterwards
    client.set("k3", "v3").unwrap();
    assert!(c.store().is_resident("k3"));
}

#[test]
fn test_node_can_rejoin_after_leaving() {
    let cluster = Cluster::new();
    cluster.join("a");
    let b = cluster.join("b");
    let client = cluster.client();
    client.set("k", "v").unwrap();

    b.unregister();
    cluster.connector.detach(&node_addr("b"));
    client.set("k2", "v2").unwrap();

    let b2 = cluster.join("b");
    assert_eq!(b2.store().get("k2"), Some(b"v2".to_vec()));
    assert_eq!(cluster.broker.len(), 2);
}

#[test]
fn test_last_node_leaving_gives_zero_nodes() {
    let cluster = Cluster::new();
    let a = cluster.join("a");
    let client = cluster.client();
    client.set("k", "v").unwrap();

    a.unregister();

    match client.get("k") {
        Err(CacheError::Remote { code, .. }) => assert_eq!(code, ErrorCode::ZeroNodes),
        other => panic!("Expected ZERO_NODES, got {:?}", other),
    }
}

#[test]
fn test_writes_during_membership_changes() {
    let cluster = Arc::new(Cluster::new());
    cluster.join("a");
    cluster.join("b");
    let leaving = cluster.join("c");

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let cluster = Arc::clone(&cluster);
            thread::spawn(move || {
                let client = cluster.client();
                for i in 0..50 {
                    // Either outcome is fine; neither may panic or hang
                    let _ = client.set(&format!("w{}-{}", w, i), "v");
                }
            })
        })
        .collect();

    leaving.unregister();
    cluster.join("d");

    for writer in writers {
        writer.join().unwrap();
    }

    let client = cluster.client();
    client.set("after", "v").unwrap();
    assert_eq!(client.get("after").unwrap(), Some(b"v".to_vec()));
    assert_eq!(cluster.broker.len(), 3);
}

// =============================================================================
// Expiry
// =============================================================================

#[test]
fn test_ttl_expires_through_the_cluster() {
    let cluster = Cluster::new();
    let clock = Arc::new(ManualClock::new(1_000_000));
    let a = cluster.join_with_clock("a", clock.clone());
    let b = cluster.join_with_clock("b", clock.clone());
    let client = cluster.client();

    client.set_with("session", "token", Some(10), true).unwrap();
    assert_eq!(client.get("session").unwrap(), Some(b"token".to_vec()));

    clock.advance(Duration::from_secs(11));
    assert_eq!(client.get("session").unwrap(), None);

    // The owner purged it on read; the other node still holds it until read
    let owner = cluster.broker.get_node_by_key("session").unwrap();
    let (owning, other) = if owner.id() == a.id() { (a, b) } else { (b, a) };
    assert!(!owning.store().is_resident("session"));
    assert!(other.store().is_resident("session"));
}

#[test]
fn test_overwrite_without_ttl_keeps_key() {
    let cluster = Cluster::new();
    let clock = Arc::new(ManualClock::new(0));
    cluster.join_with_clock("a", clock.clone());
    let client = cluster.client();

    client.set_with("k", "short", Some(5), true).unwrap();
    client.set("k", "forever").unwrap();

    clock.advance(Duration::from_secs(60));
    assert_eq!(client.get("k").unwrap(), Some(b"forever".to_vec()));
}

// =============================================================================
// Client
// =============================================================================

#[test]
fn test_client_ping() {
    let cluster = Cluster::new();
    cluster.client().ping().unwrap();
}
