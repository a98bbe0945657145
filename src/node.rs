//! Node Agent
//!
//! Owns one cache store, serves data-path requests from the broker, and
//! drives its own registration lifecycle.
//!
//! ## Lifecycle
//! ```text
//! UNREGISTERED ──register()──► REGISTERING ──reply──► REGISTERED
//!      ▲                            │                     │
//!      └──── broker unreachable ────┘                unregister()
//!                                                         ▼
//!                                    STOPPED ◄──── UNREGISTERING
//! ```
//! Only `REGISTERED` serves get/set/remove/snapshot; `ping` is answered in
//! every state.

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::network::{Link, Service};
use crate::protocol::{Action, Reply, Request};

/// Unique node identity, stable for the lifetime of a process
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Fresh random identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registration state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unregistered,
    Registering,
    Registered,
    Unregistering,
    Stopped,
}

#[derive(Debug)]
struct Lifecycle {
    state: NodeState,

    /// Ordinal assigned by the broker at registration
    ordinal: Option<usize>,
}

type Handler = fn(&Node, &Request) -> Result<Reply>;

/// Actions a node accepts, each with its handler
const NODE_HANDLERS: [(Action, Handler); 5] = [
    (Action::Get, Node::on_get as Handler),
    (Action::Set, Node::on_set as Handler),
    (Action::Remove, Node::on_remove as Handler),
    (Action::Ping, Node::on_ping as Handler),
    (Action::Snapshot, Node::on_snapshot as Handler),
];

/// A storage node
pub struct Node {
    id: NodeId,

    /// Address the broker uses to reach this node
    address: String,

    broker: Arc<dyn Link>,

    /// Mutated only by this node's handlers, one at a time
    store: Mutex<CacheStore>,

    lifecycle: Mutex<Lifecycle>,

    unregister_timeout: Duration,
}

impl Node {
    /// Create a node with an empty store on the system clock
    pub fn new(config: &Config, broker: Arc<dyn Link>) -> Self {
        Self::with_store(config, broker, CacheStore::new())
    }

    /// Create a node around an existing store
    pub fn with_store(config: &Config, broker: Arc<dyn Link>, store: CacheStore) -> Self {
        let id = config
            .node_id
            .clone()
            .map(NodeId::from)
            .unwrap_or_else(NodeId::generate);

        Self {
            id,
            address: config.advertised_addr().to_string(),
            broker,
            store: Mutex::new(store),
            lifecycle: Mutex::new(Lifecycle {
                state: NodeState::Unregistered,
                ordinal: None,
            }),
            unregister_timeout: config.unregister_timeout(),
        }
    }

    // =========================================================================
    // Registration lifecycle
    // =========================================================================

    /// Register with the broker and load the bootstrap snapshot, if any
    ///
    /// Returns the ordinal assigned by the broker. On failure the node goes
    /// back to `Unregistered` and keeps refusing data-path requests. Unless
    /// the broker explicitly rejected it, the broker may still have admitted
    /// the node, so a best-effort unregister is sent first.
    pub fn register(&self) -> Result<usize> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != NodeState::Unregistered {
                return Err(CacheError::InvalidState(format!(
                    "cannot register while {:?}",
                    lifecycle.state
                )));
            }
            lifecycle.state = NodeState::Registering;
        }

        tracing::info!("Registering node {} ({})", self.id, self.address);
        let request = Request::register(self.id.as_str(), self.address.as_str());

        match self.broker.call(&request).and_then(Reply::into_result) {
            Ok(Reply::Registered { node, snapshot }) => {
                if let Some(snapshot) = snapshot {
                    tracing::info!("Bootstrapping from snapshot with {} entries", snapshot.len());
                    self.store.lock().replay(snapshot, false);
                }

                let stopped = {
                    let mut lifecycle = self.lifecycle.lock();
                    if lifecycle.state == NodeState::Registering {
                        lifecycle.state = NodeState::Registered;
                        lifecycle.ordinal = Some(node);
                        None
                    } else {
                        Some(lifecycle.state)
                    }
                };

                match stopped {
                    None => {
                        tracing::info!("Node {} registered as #{}", self.id, node);
                        Ok(node)
                    }
                    Some(state) => {
                        // Stopped while the broker was admitting us
                        tracing::warn!("Node {} became {:?} while registering", self.id, state);
                        self.send_unregister();
                        Err(CacheError::InvalidState(format!(
                            "stopped while registering ({:?})",
                            state
                        )))
                    }
                }
            }
            Ok(other) => {
                self.send_unregister();
                self.reset_to_unregistered();
                Err(CacheError::Protocol(format!(
                    "unexpected reply to register: {:?}",
                    other
                )))
            }
            Err(e) => {
                tracing::warn!("Registration of node {} failed: {}", self.id, e);
                if !matches!(e, CacheError::Remote { .. }) {
                    self.send_unregister();
                }
                self.reset_to_unregistered();
                Err(e)
            }
        }
    }

    /// Leave the cluster and stop
    ///
    /// The unregister message is only sent when registered and is
    /// best-effort: the wait for the broker is bounded and its outcome
    /// never prevents the node from reaching `Stopped`.
    pub fn unregister(&self) {
        let was_registered = {
            let mut lifecycle = self.lifecycle.lock();
            let was_registered = lifecycle.state == NodeState::Registered;
            if was_registered {
                lifecycle.state = NodeState::Unregistering;
            }
            was_registered
        };

        if was_registered {
            self.send_unregister();
        }

        let mut lifecycle = self.lifecycle.lock();
        lifecycle.state = NodeState::Stopped;
        lifecycle.ordinal = None;
        tracing::info!("Node {} stopped", self.id);
    }

    fn send_unregister(&self) {
        let (tx, rx) = channel::bounded(1);
        let broker = Arc::clone(&self.broker);
        let request = Request::unregister(self.id.as_str());

        thread::spawn(move || {
            let _ = tx.send(broker.call(&request).and_then(Reply::into_result));
        });

        match rx.recv_timeout(self.unregister_timeout) {
            Ok(Ok(_)) => tracing::info!("Node {} unregistered", self.id),
            Ok(Err(e)) => tracing::warn!("Unregister of node {} failed: {}", self.id, e),
            Err(_) => tracing::warn!(
                "Unregister of node {} got no reply within {:?}",
                self.id,
                self.unregister_timeout
            ),
        }
    }

    /// Undo a failed registration unless the node was stopped meanwhile
    fn reset_to_unregistered(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state == NodeState::Registering {
            lifecycle.state = NodeState::Unregistered;
        }
        lifecycle.ordinal = None;
    }

    // =========================================================================
    // Request handling
    // =========================================================================

    fn handler_for(action: Action) -> Option<Handler> {
        NODE_HANDLERS
            .iter()
            .find(|(allowed, _)| *allowed == action)
            .map(|(_, handler)| *handler)
    }

    fn dispatch(&self, request: &Request) -> Result<Reply> {
        let action = request.parse_action()?;
        let handler = Self::handler_for(action)
            .ok_or_else(|| CacheError::Forbidden(request.action.clone()))?;

        if action != Action::Ping && !self.is_registered() {
            return Err(CacheError::NotRegistered);
        }

        handler(self, request)
    }

    fn on_get(&self, request: &Request) -> Result<Reply> {
        let key = request.key()?;
        Ok(Reply::Value(self.store.lock().get(key)))
    }

    fn on_set(&self, request: &Request) -> Result<Reply> {
        let key = request.key()?;
        let value = request.value()?;
        self.store.lock().set(key, value.to_vec(), request.ttl());
        Ok(Reply::Stored)
    }

    fn on_remove(&self, request: &Request) -> Result<Reply> {
        let key = request.key()?;
        Ok(Reply::Removed(self.store.lock().remove(key)))
    }

    fn on_ping(&self, _request: &Request) -> Result<Reply> {
        Ok(Reply::Pong)
    }

    fn on_snapshot(&self, _request: &Request) -> Result<Reply> {
        Ok(Reply::Snapshot(self.store.lock().snapshot()))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> NodeState {
        self.lifecycle.lock().state
    }

    pub fn ordinal(&self) -> Option<usize> {
        self.lifecycle.lock().ordinal
    }

    pub fn is_registered(&self) -> bool {
        self.state() == NodeState::Registered
    }

    /// Lock the store for direct inspection
    pub fn store(&self) -> MutexGuard<'_, CacheStore> {
        self.store.lock()
    }
}

impl Service for Node {
    fn handle(&self, request: Request) -> Reply {
        match self.dispatch(&request) {
            Ok(reply) => reply,
            Err(e) => {
                match e {
                    CacheError::Forbidden(_) | CacheError::NotRegistered => {
                        tracing::debug!("Node {} refused '{}': {}", self.id, request.action, e)
                    }
                    _ => tracing::error!("Node {} failed '{}': {}", self.id, request.action, e),
                }
                Reply::from_error(&e)
            }
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("state", &self.state())
            .finish()
    }
}
