//! In-process transport
//!
//! Routes requests to services living in the same process, keyed by a
//! made-up address. Every request and reply is passed through the wire
//! codec so behaviour matches the TCP transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{CacheError, Result};
use crate::network::{Connector, Link, Service};
use crate::protocol::{decode_reply, decode_request, encode_reply, encode_request, Reply, Request};

type Services = Arc<RwLock<HashMap<String, Arc<dyn Service>>>>;

/// Address book of in-process services
#[derive(Clone, Default)]
pub struct LocalConnector {
    services: Services,
}

impl LocalConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `service` reachable at `address`
    pub fn attach(&self, address: impl Into<String>, service: Arc<dyn Service>) {
        self.services.write().insert(address.into(), service);
    }

    /// Make `address` unreachable, as if its process died
    pub fn detach(&self, address: &str) -> bool {
        self.services.write().remove(address).is_some()
    }

    pub fn is_attached(&self, address: &str) -> bool {
        self.services.read().contains_key(address)
    }

    /// Link to `address` without checking that anything is attached there
    pub fn link(&self, address: impl Into<String>) -> LocalLink {
        LocalLink {
            address: address.into(),
            services: Arc::clone(&self.services),
            closed: AtomicBool::new(false),
        }
    }
}

impl Connector for LocalConnector {
    fn connect(&self, address: &str) -> Result<Arc<dyn Link>> {
        if !self.is_attached(address) {
            return Err(CacheError::Unreachable(address.to_string()));
        }
        Ok(Arc::new(self.link(address)))
    }
}

/// Link to one in-process service
pub struct LocalLink {
    address: String,
    services: Services,
    closed: AtomicBool,
}

impl LocalLink {
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Link for LocalLink {
    fn call(&self, request: &Request) -> Result<Reply> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Unreachable(self.address.clone()));
        }

        // Release the address book before handling: the service may call
        // back into other services.
        let service = self
            .services
            .read()
            .get(&self.address)
            .cloned()
            .ok_or_else(|| CacheError::Unreachable(self.address.clone()))?;

        let request = decode_request(&encode_request(request)?)?;
        let reply = service.handle(request);
        decode_reply(&encode_reply(&reply)?)
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
