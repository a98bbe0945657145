//! Broker Module
//!
//! Maintains cluster membership, routes reads, fans out writes and
//! bootstraps joining nodes.
//!
//! ## Routing
//! - Reads go to exactly one node: the owner of the key on a ring built
//!   over the current membership size.
//! - Writes go to the owner (the primary, whose reply the client sees) and
//!   to every other member. With `wait_all` the client reply waits for all
//!   of them; without it, only for the primary.
//!
//! Every node therefore ends up holding every key. The ring decides where a
//! key is read from, not where it is stored.
//!
//! ## Bootstrap
//! A joining node is connected first, then added to the membership, then
//! sent a snapshot taken from another member. Writes landing on that member
//! while the snapshot is in transit may be missing from it.

mod member;
mod registry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::cache::Snapshot;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::network::{Connector, Service};
use crate::node::NodeId;
use crate::protocol::{Action, ErrorCode, Reply, Request};
use crate::ring::HashRing;

pub use member::Member;
pub use registry::Registry;

type Handler = fn(&Broker, &Request) -> Result<Reply>;

/// Actions a client or node may send to the broker
const BROKER_ALLOWED: [Action; 7] = [
    Action::Register,
    Action::Unregister,
    Action::Ping,
    Action::Route,
    Action::Set,
    Action::Get,
    Action::Remove,
];

/// Allowed actions that have a handler
const BROKER_HANDLERS: [(Action, Handler); 6] = [
    (Action::Register, Broker::on_register as Handler),
    (Action::Unregister, Broker::on_unregister as Handler),
    (Action::Ping, Broker::on_ping as Handler),
    (Action::Set, Broker::on_set as Handler),
    (Action::Get, Broker::on_get as Handler),
    (Action::Remove, Broker::on_remove as Handler),
];

/// The cluster broker
pub struct Broker {
    config: Config,
    connector: Arc<dyn Connector>,

    /// Membership, read by routing and fan-out
    registry: Arc<RwLock<Registry>>,

    /// Serializes register/unregister
    membership: Mutex<()>,

    next_generation: AtomicU64,
}

impl Broker {
    /// Create a broker that reaches nodes through `connector`
    ///
    /// Fails if `replicas_per_shard` is zero.
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Result<Self> {
        HashRing::new(1, config.replicas_per_shard)?;

        Ok(Self {
            config,
            connector,
            registry: Arc::new(RwLock::new(Registry::new())),
            membership: Mutex::new(()),
            next_generation: AtomicU64::new(0),
        })
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Admit a node and build its registration reply
    ///
    /// The first member gets no snapshot. Any later member gets a snapshot
    /// of another member's store. If that snapshot cannot be fetched the
    /// registration is rolled back.
    pub fn register(&self, id: &str, address: &str) -> Result<Reply> {
        let _membership = self.membership.lock();
        let id = NodeId::from(id);

        // Connected before it becomes routable
        let link = self.connector.connect(address)?;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let member = Member::spawn(
            id.clone(),
            address,
            generation,
            link,
            Arc::downgrade(&self.registry),
            self.config.evict_unreachable,
        )?;

        let (ordinal, replaced, peer, size) = {
            let mut registry = self.registry.write();
            let (ordinal, replaced) = registry.insert(member);
            (ordinal, replaced, registry.peer_of(&id), registry.len())
        };

        if let Some(previous) = replaced {
            tracing::info!("Node {} re-registered, replacing its connection", id);
            previous.close();
        }
        tracing::info!(
            "Registered node {} at {} as #{} ({} members)",
            id,
            address,
            ordinal,
            size
        );

        let snapshot = match peer {
            None => None,
            Some(peer) => match Self::fetch_snapshot(&peer) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!(
                        "Bootstrap snapshot for {} from {} failed, rolling back: {}",
                        id,
                        peer.id(),
                        e
                    );
                    let removed = self.registry.write().remove_generation(&id, generation);
                    if let Some(member) = removed {
                        member.close();
                    }
                    return Err(e);
                }
            },
        };

        Ok(Reply::Registered {
            node: ordinal,
            snapshot,
        })
    }

    fn fetch_snapshot(peer: &Member) -> Result<Snapshot> {
        match peer.call(Request::snapshot())?.into_result()? {
            Reply::Snapshot(snapshot) => {
                tracing::debug!("Fetched snapshot of {} entries from {}", snapshot.len(), peer.id());
                Ok(snapshot)
            }
            other => Err(CacheError::Protocol(format!(
                "unexpected reply to snapshot: {:?}",
                other
            ))),
        }
    }

    /// Remove a node from the membership and close its connection
    ///
    /// Unknown identities are ignored.
    pub fn unregister(&self, id: &str) {
        let _membership = self.membership.lock();
        let id = NodeId::from(id);

        let removed = self.registry.write().remove(&id);
        match removed {
            Some(member) => {
                member.close();
                tracing::info!(
                    "Unregistered node {} ({} members left)",
                    id,
                    self.registry.read().len()
                );
            }
            None => tracing::debug!("Unregister for unknown node {} ignored", id),
        }
    }

    // =========================================================================
    // Routing
    // =========================================================================

    /// Member owning `key` under the current membership
    pub fn get_node_by_key(&self, key: &str) -> Result<Member> {
        self.registry
            .read()
            .owner(key, self.config.replicas_per_shard)
    }

    /// Read `key` from its owner; the owner's reply is returned as-is
    pub fn get(&self, request: &Request) -> Result<Reply> {
        let owner = self.get_node_by_key(request.key()?)?;
        tracing::trace!("get {:?} -> {}", request.key, owner.id());
        owner.call(request.clone())
    }

    /// Store a key on every member
    pub fn set(&self, request: &Request) -> Result<Reply> {
        request.value()?;
        self.batch(request)
    }

    /// Remove a key from every member
    pub fn remove(&self, request: &Request) -> Result<Reply> {
        self.batch(request)
    }

    /// Send a write to the key's owner and to every other member
    ///
    /// Iterates over a copy of the membership taken at the start, so a
    /// concurrent unregister cannot invalidate it. Returns the primary's
    /// reply. With `wait_all`, any secondary failure fails the write.
    fn batch(&self, request: &Request) -> Result<Reply> {
        let key = request.key()?;
        let wait_all = request.wait_all();

        let (primary, secondaries) = {
            let registry = self.registry.read();
            let primary = registry.owner(key, self.config.replicas_per_shard)?;
            let secondaries: Vec<Member> = registry
                .members()
                .into_iter()
                .filter(|m| m.id() != primary.id())
                .collect();
            (primary, secondaries)
        };

        tracing::trace!(
            "{} {:?}: primary {}, {} secondaries, wait_all={}",
            request.action,
            key,
            primary.id(),
            secondaries.len(),
            wait_all
        );

        let primary_outcome = primary.submit(request.clone())?;

        let mut pending = Vec::with_capacity(secondaries.len());
        for member in &secondaries {
            if wait_all {
                pending.push((member.id().clone(), member.submit(request.clone())));
            } else if let Err(e) = member.send(request.clone()) {
                tracing::warn!("Could not queue '{}' for node {}: {}", request.action, member.id(), e);
            }
        }

        let reply = primary_outcome
            .recv()
            .map_err(|_| CacheError::Unreachable(primary.address().to_string()))??;

        let total = pending.len();
        let mut failed = 0;
        for (id, outcome) in pending {
            let result = outcome.and_then(|rx| {
                rx.recv()
                    .map_err(|_| CacheError::Unreachable(id.to_string()))?
                    .and_then(Reply::into_result)
            });
            if let Err(e) = result {
                tracing::warn!("Replicating '{}' to node {} failed: {}", request.action, id, e);
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(CacheError::FanOut { failed, total });
        }
        Ok(reply)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    fn handler_for(action: Action) -> Option<Handler> {
        BROKER_HANDLERS
            .iter()
            .find(|(known, _)| *known == action)
            .map(|(_, handler)| *handler)
    }

    fn dispatch(&self, request: &Request) -> Result<Reply> {
        let action = request.parse_action()?;
        if !BROKER_ALLOWED.contains(&action) {
            return Err(CacheError::Forbidden(request.action.clone()));
        }
        let handler = Self::handler_for(action)
            .ok_or_else(|| CacheError::NotImplemented(request.action.clone()))?;
        handler(self, request)
    }

    fn on_register(&self, request: &Request) -> Result<Reply> {
        self.register(request.id()?, request.address()?)
    }

    fn on_unregister(&self, request: &Request) -> Result<Reply> {
        self.unregister(request.id()?);
        Ok(Reply::Unregistered)
    }

    fn on_ping(&self, _request: &Request) -> Result<Reply> {
        Ok(Reply::Pong)
    }

    fn on_get(&self, request: &Request) -> Result<Reply> {
        self.get(request)
    }

    fn on_set(&self, request: &Request) -> Result<Reply> {
        self.set(request)
    }

    fn on_remove(&self, request: &Request) -> Result<Reply> {
        self.remove(request)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Identities in registration order
    pub fn members(&self) -> Vec<NodeId> {
        self.registry.read().ids()
    }

    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Client-facing code for a failed broker action
///
/// Node-side failures collapse into `UNKNOWN_ERROR`; only protocol and
/// routing conditions keep their own code.
fn client_code(err: &CacheError) -> ErrorCode {
    match err {
        CacheError::Forbidden(_) => ErrorCode::Forbidden,
        CacheError::NotImplemented(_) => ErrorCode::NotImplemented,
        CacheError::ZeroNodes => ErrorCode::ZeroNodes,
        _ => ErrorCode::UnknownError,
    }
}

impl Service for Broker {
    fn handle(&self, request: Request) -> Reply {
        match self.dispatch(&request) {
            Ok(reply) => reply,
            Err(e) => {
                let code = client_code(&e);
                match code {
                    ErrorCode::UnknownError => {
                        tracing::error!("Action '{}' failed: {}", request.action, e)
                    }
                    _ => tracing::debug!("Action '{}' rejected: {}", request.action, e),
                }
                Reply::error(code, e.to_string())
            }
        }
    }
}
