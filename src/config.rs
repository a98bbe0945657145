//! Configuration for ShardCache
//!
//! Centralized configuration with sensible defaults. The same struct is used
//! by the broker, the nodes and the client; each reads the fields it needs.

use std::time::Duration;

use crate::protocol::MAX_REPLY_SIZE;

/// Main configuration for a ShardCache process
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address of this process
    pub listen_addr: String,

    /// Address of the broker (used by nodes and clients)
    pub broker_addr: String,

    /// Address a node reports to the broker at registration.
    /// Falls back to `listen_addr` when unset.
    pub advertise_addr: Option<String>,

    /// Max concurrent inbound connections
    pub max_connections: usize,

    /// Largest reply payload a server will send (bytes, capped at 1 GB)
    pub max_reply_bytes: u32,

    // -------------------------------------------------------------------------
    // Timeouts
    // -------------------------------------------------------------------------
    /// Read/write timeout of every outbound call (milliseconds)
    pub request_timeout_ms: u64,

    /// TCP connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Upper bound on a node's best-effort unregister at shutdown (milliseconds)
    pub unregister_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Cluster Configuration
    // -------------------------------------------------------------------------
    /// Caller-supplied node identity; a UUID is generated when unset
    pub node_id: Option<String>,

    /// Virtual positions per member on the hash ring
    pub replicas_per_shard: usize,

    /// Drop a member from the registry when a call reports it unreachable
    pub evict_unreachable: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7070".to_string(),
            broker_addr: "127.0.0.1:7070".to_string(),
            advertise_addr: None,
            max_connections: 1024,
            max_reply_bytes: MAX_REPLY_SIZE,
            request_timeout_ms: 5000,
            connect_timeout_ms: 2000,
            unregister_timeout_ms: 2000,
            node_id: None,
            replicas_per_shard: 32,
            evict_unreachable: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Address a node should report to the broker
    pub fn advertised_addr(&self) -> &str {
        self.advertise_addr.as_deref().unwrap_or(&self.listen_addr)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn unregister_timeout(&self) -> Duration {
        Duration::from_millis(self.unregister_timeout_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the broker address
    pub fn broker_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.broker_addr = addr.into();
        self
    }

    /// Set the address a node advertises at registration
    pub fn advertise_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.advertise_addr = Some(addr.into());
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the largest reply payload a server will send
    pub fn max_reply_bytes(mut self, bytes: u32) -> Self {
        self.config.max_reply_bytes = bytes;
        self
    }

    /// Set the per-call request timeout (in milliseconds)
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the shutdown unregister bound (in milliseconds)
    pub fn unregister_timeout_ms(mut self, ms: u64) -> Self {
        self.config.unregister_timeout_ms = ms;
        self
    }

    /// Set a fixed node identity
    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.config.node_id = Some(id.into());
        self
    }

    /// Set the number of virtual ring positions per member
    pub fn replicas_per_shard(mut self, replicas: usize) -> Self {
        self.config.replicas_per_shard = replicas;
        self
    }

    /// Enable or disable eviction of unreachable members
    pub fn evict_unreachable(mut self, evict: bool) -> Self {
        self.config.evict_unreachable = evict;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
