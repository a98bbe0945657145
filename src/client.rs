//! Client Facade
//!
//! Thin blocking wrapper used by applications to talk to the broker.

use std::sync::Arc;

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::network::{Link, TcpLink};
use crate::protocol::{Reply, Request};

/// Blocking client for the broker
pub struct Client {
    link: Arc<dyn Link>,
}

impl Client {
    /// Connect to the broker at `config.broker_addr`
    pub fn connect(config: &Config) -> Result<Self> {
        let link = TcpLink::connect(config.broker_addr.as_str(), config)?;
        Ok(Self::with_link(Arc::new(link)))
    }

    /// Talk to the broker through an existing link
    pub fn with_link(link: Arc<dyn Link>) -> Self {
        Self { link }
    }

    /// Value of `key`, or `None` if it is absent
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.request(Request::get(key))? {
            Reply::Value(value) => Ok(value),
            other => Err(unexpected("get", other)),
        }
    }

    /// Store `key` on every node, waiting for all of them
    pub fn set(&self, key: &str, value: impl Into<Vec<u8>>) -> Result<()> {
        self.set_with(key, value, None, true)
    }

    /// Store `key` with an optional TTL (seconds) and durability choice
    pub fn set_with(
        &self,
        key: &str,
        value: impl Into<Vec<u8>>,
        ttl_secs: Option<u64>,
        wait_all: bool,
    ) -> Result<()> {
        let mut request = Request::set(key, value).with_wait_all(wait_all);
        if let Some(ttl) = ttl_secs {
            request = request.with_ttl(ttl);
        }
        match self.request(request)? {
            Reply::Stored => Ok(()),
            other => Err(unexpected("set", other)),
        }
    }

    /// Remove `key` from every node, waiting for all of them
    ///
    /// Returns whether the key existed on its owner.
    pub fn remove(&self, key: &str) -> Result<bool> {
        self.remove_with(key, true)
    }

    pub fn remove_with(&self, key: &str, wait_all: bool) -> Result<bool> {
        match self.request(Request::remove(key).with_wait_all(wait_all))? {
            Reply::Removed(existed) => Ok(existed),
            other => Err(unexpected("remove", other)),
        }
    }

    /// Check that the broker answers
    pub fn ping(&self) -> Result<()> {
        match self.request(Request::ping())? {
            Reply::Pong => Ok(()),
            other => Err(unexpected("ping", other)),
        }
    }

    fn request(&self, request: Request) -> Result<Reply> {
        self.link.call(&request)?.into_result()
    }
}

fn unexpected(action: &str, reply: Reply) -> CacheError {
    CacheError::Protocol(format!("unexpected reply to {}: {:?}", action, reply))
}
