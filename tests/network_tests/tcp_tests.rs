//! TCP Tests
//!
//! Runs a broker and nodes on loopback sockets and drives them with the
//! client, covering the real transport end to end.

use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use shardcache::network::{Link, Server, Service, TcpConnector, TcpLink};
use shardcache::protocol::{
    read_reply, write_request, ErrorCode, Reply, Request, MAX_PAYLOAD_SIZE, MAX_REPLY_SIZE,
};
use shardcache::{Broker, CacheError, Client, Config, Node, NodeId};

// =============================================================================
// Helper Functions
// =============================================================================

/// A loopback address nothing is listening on
fn free_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

fn serve(config: Config, service: Arc<dyn Service>) -> (SocketAddr, Arc<AtomicBool>) {
    let mut server = Server::new(config, service);
    let addr = server.bind().unwrap();
    let shutdown = server.shutdown_handle();
    thread::spawn(move || server.run());
    (addr, shutdown)
}

struct TcpCluster {
    broker: Arc<Broker>,
    broker_addr: String,
    stops: Vec<Arc<AtomicBool>>,
}

impl TcpCluster {
    fn start() -> Self {
        let config = Config::builder()
            .listen_addr("127.0.0.1:0")
            .request_timeout_ms(10_000)
            .connect_timeout_ms(500)
            .replicas_per_shard(16)
            .build();
        let connector = Arc::new(TcpConnector::new(config.clone()));
        let broker = Arc::new(Broker::new(config.clone(), connector).unwrap());
        let (addr, stop) = serve(config, broker.clone());

        Self {
            broker,
            broker_addr: addr.to_string(),
            stops: vec![stop],
        }
    }

    /// Serve a node without registering it
    fn start_node(&mut self, name: &str, max_reply_bytes: u32) -> Arc<Node> {
        let addr = free_addr();
        let config = Config::builder()
            .listen_addr(addr.as_str())
            .broker_addr(self.broker_addr.as_str())
            .node_id(name)
            .request_timeout_ms(10_000)
            .unregister_timeout_ms(1000)
            .max_reply_bytes(max_reply_bytes)
            .build();

        let broker = Arc::new(TcpLink::new(self.broker_addr.as_str(), &config));
        let node = Arc::new(Node::new(&config, broker));
        let (_, stop) = serve(config, node.clone());
        self.stops.push(stop);
        node
    }

    fn join(&mut self, name: &str) -> Arc<Node> {
        let node = self.start_node(name, MAX_REPLY_SIZE);
        node.register().unwrap();
        node
    }

    fn client(&self) -> Client {
        let config = Config::builder()
            .broker_addr(self.broker_addr.as_str())
            .build();
        Client::connect(&config).unwrap()
    }
}

impl Drop for TcpCluster {
    fn drop(&mut self) {
        for stop in &self.stops {
            stop.store(true, Ordering::Relaxed);
        }
    }
}

// =============================================================================
// End to End
// =============================================================================

#[test]
fn test_cluster_over_tcp() {
    let mut cluster = TcpCluster::start();
    let a = cluster.join("a");
    let b = cluster.join("b");
    let client = cluster.client();

    client.ping().unwrap();
    client.set("k1", "v1").unwrap();
    client.set_with("k2", "v2", Some(3600), true).unwrap();

    assert_eq!(client.get("k1").unwrap(), Some(b"v1".to_vec()));
    assert!(a.store().is_resident("k2"));
    assert!(b.store().is_resident("k2"));

    // Late joiner gets a snapshot over the wire
    let c = cluster.join("c");
    assert_eq!(c.store().get("k1"), Some(b"v1".to_vec()));
    assert!(c.store().expires_at("k2").is_some());

    assert!(client.remove("k1").unwrap());
    assert_eq!(client.get("k1").unwrap(), None);
    assert!(!c.store().is_resident("k1"));

    c.unregister();
    assert_eq!(client.get("k2").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn test_zero_nodes_over_tcp() {
    let cluster = TcpCluster::start();
    match cluster.client().get("k") {
        Err(CacheError::Remote { code, .. }) => assert_eq!(code, ErrorCode::ZeroNodes),
        other => panic!("Expected ZERO_NODES, got {:?}", other),
    }
}

#[test]
fn test_client_without_broker_is_unreachable() {
    let config = Config::builder()
        .broker_addr(free_addr())
        .connect_timeout_ms(500)
        .build();
    assert!(matches!(Client::connect(&config), Err(CacheError::Unreachable(_))));
}

// =============================================================================
// Large Snapshots
// =============================================================================

fn fill(node: &Node, entries: usize, size: usize) {
    let mut store = node.store();
    for i in 0..entries {
        store.set(format!("blob-{}", i), vec![i as u8; size], None);
    }
}

#[test]
fn test_snapshot_larger_than_request_limit_bootstraps() {
    let mut cluster = TcpCluster::start();
    let a = cluster.join("a");
    fill(&a, 17, 1024 * 1024);
    assert!(17 * 1024 * 1024 > MAX_PAYLOAD_SIZE as usize);

    let b = cluster.join("b");

    assert!(b.is_registered());
    assert_eq!(cluster.broker.len(), 2);
    assert_eq!(b.store().len(), 17);
    assert_eq!(b.store().get("blob-16"), Some(vec![16u8; 1024 * 1024]));
    assert!(a.is_registered());

    let client = cluster.client();
    client.set("after", "v").unwrap();
    assert!(a.store().is_resident("after"));
    assert!(b.store().is_resident("after"));
}

#[test]
fn test_unsendable_snapshot_keeps_source_member() {
    let mut cluster = TcpCluster::start();
    let a = cluster.start_node("a", 64 * 1024);
    a.register().unwrap();
    fill(&a, 4, 64 * 1024);

    let b = cluster.start_node("b", MAX_REPLY_SIZE);
    match b.register() {
        Err(CacheError::Remote { code, .. }) => assert_eq!(code, ErrorCode::UnknownError),
        other => panic!("Expected registration to fail, got {:?}", other),
    }
    assert!(!b.is_registered());
    assert_eq!(cluster.broker.members(), vec![NodeId::from("a")]);

    // The source answered with an error instead of dropping the connection,
    // so it is still a member and still serving
    assert!(a.is_registered());
    let client = cluster.client();
    client.set("k", "v").unwrap();
    assert_eq!(client.get("k").unwrap(), Some(b"v".to_vec()));
    assert!(a.store().is_resident("k"));
    assert!(!b.store().is_resident("k"));
}

// =============================================================================
// Connection Handling
// =============================================================================

#[test]
fn test_closed_link_stays_closed() {
    let cluster = TcpCluster::start();
    let config = Config::builder().build();
    let link = TcpLink::connect(cluster.broker_addr.as_str(), &config).unwrap();

    assert_eq!(link.call(&Request::ping()).unwrap(), Reply::Pong);
    link.close().unwrap();

    assert!(matches!(link.call(&Request::ping()), Err(CacheError::Unreachable(_))));
    assert!(matches!(link.call(&Request::ping()), Err(CacheError::Unreachable(_))));
}

#[test]
fn test_undecodable_request_keeps_connection_open() {
    let cluster = TcpCluster::start();
    let mut stream = TcpStream::connect(cluster.broker_addr.as_str()).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    // Well-formed frame around a payload that is not a request
    let payload = [0xffu8; 4];
    let mut frame = Vec::new();
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());
    frame.extend_from_slice(&payload);
    stream.write_all(&frame).unwrap();

    match read_reply(&mut reader).unwrap() {
        Reply::Error { code, .. } => assert_eq!(code, ErrorCode::UnknownError),
        other => panic!("Expected error reply, got {:?}", other),
    }

    write_request(&mut stream, &Request::ping()).unwrap();
    assert_eq!(read_reply(&mut reader).unwrap(), Reply::Pong);
}

#[test]
fn test_forbidden_action_over_tcp() {
    let cluster = TcpCluster::start();
    let mut stream = TcpStream::connect(cluster.broker_addr.as_str()).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    write_request(&mut stream, &Request::raw("shutdown")).unwrap();
    match read_reply(&mut reader).unwrap() {
        Reply::Error { code, .. } => assert_eq!(code, ErrorCode::Forbidden),
        other => panic!("Expected FORBIDDEN, got {:?}", other),
    }
}
