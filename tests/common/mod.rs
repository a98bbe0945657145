//! Shared helpers for the integration tests
//!
//! Builds whole clusters on the in-process transport.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use shardcache::cache::{CacheStore, Clock};
use shardcache::network::LocalConnector;
use shardcache::{Broker, Client, Config, Node};

pub const BROKER_ADDR: &str = "local://broker";

pub fn node_addr(name: &str) -> String {
    format!("local://{}", name)
}

/// Broker plus nodes wired through one `LocalConnector`
pub struct Cluster {
    pub connector: LocalConnector,
    pub broker: Arc<Broker>,
}

impl Cluster {
    pub fn new() -> Self {
        Self::with_config(Config::builder().replicas_per_shard(16).build())
    }

    pub fn with_config(config: Config) -> Self {
        let connector = LocalConnector::new();
        let broker = Arc::new(Broker::new(config, Arc::new(connector.clone())).unwrap());
        connector.attach(BROKER_ADDR, broker.clone());
        Self { connector, broker }
    }

    fn node_config(name: &str) -> Config {
        Config::builder()
            .node_id(name)
            .advertise_addr(node_addr(name))
            .unregister_timeout_ms(500)
            .build()
    }

    /// Create and attach a node without registering it
    pub fn spawn_node(&self, name: &str) -> Arc<Node> {
        let broker = Arc::new(self.connector.link(BROKER_ADDR));
        let node = Arc::new(Node::new(&Self::node_config(name), broker));
        self.connector.attach(node_addr(name), node.clone());
        node
    }

    /// Create, attach and register a node whose store reads `clock`
    pub fn join_with_clock(&self, name: &str, clock: Arc<dyn Clock>) -> Arc<Node> {
        let broker = Arc::new(self.connector.link(BROKER_ADDR));
        let store = CacheStore::with_clock(clock);
        let node = Arc::new(Node::with_store(&Self::node_config(name), broker, store));
        self.connector.attach(node_addr(name), node.clone());
        node.register().unwrap();
        node
    }

    /// Create, attach and register a node
    pub fn join(&self, name: &str) -> Arc<Node> {
        let node = self.spawn_node(name);
        node.register().unwrap();
        node
    }

    pub fn client(&self) -> Client {
        Client::with_link(Arc::new(self.connector.link(BROKER_ADDR)))
    }
}

/// Poll `check` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}
