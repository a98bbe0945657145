//! Request definitions
//!
//! Represents requests sent to the broker and to nodes.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Every action name understood somewhere in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Register,
    Unregister,
    Ping,
    Route,
    Get,
    Set,
    Remove,
    Snapshot,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Register => "register",
            Action::Unregister => "unregister",
            Action::Ping => "ping",
            Action::Route => "route",
            Action::Get => "get",
            Action::Set => "set",
            Action::Remove => "remove",
            Action::Snapshot => "snapshot",
        }
    }
}

impl FromStr for Action {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "register" => Ok(Action::Register),
            "unregister" => Ok(Action::Unregister),
            "ping" => Ok(Action::Ping),
            "route" => Ok(Action::Route),
            "get" => Ok(Action::Get),
            "set" => Ok(Action::Set),
            "remove" => Ok(Action::Remove),
            "snapshot" => Ok(Action::Snapshot),
            other => Err(CacheError::Forbidden(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request message
///
/// Fields not used by an action stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Action name, validated by the receiver
    pub action: String,

    /// Node identity (register, unregister)
    pub id: Option<String>,

    /// Reachable node address (register)
    pub address: Option<String>,

    /// Cache key (get, set, remove)
    pub key: Option<String>,

    /// Value to store (set)
    pub value: Option<Vec<u8>>,

    /// Time to live in seconds (set)
    pub ttl: Option<u64>,

    /// Wait for every node before replying (set, remove); defaults to true
    pub wait_all: Option<bool>,
}

impl Request {
    /// Request carrying an arbitrary action name
    pub fn raw(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    fn new(action: Action) -> Self {
        Self::raw(action.as_str())
    }

    pub fn register(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            address: Some(address.into()),
            ..Self::new(Action::Register)
        }
    }

    pub fn unregister(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(Action::Unregister)
        }
    }

    pub fn ping() -> Self {
        Self::new(Action::Ping)
    }

    pub fn snapshot() -> Self {
        Self::new(Action::Snapshot)
    }

    pub fn get(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::new(Action::Get)
        }
    }

    pub fn set(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: Some(key.into()),
            value: Some(value.into()),
            ..Self::new(Action::Set)
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::new(Action::Remove)
        }
    }

    /// Expire the key `secs` seconds after it is stored
    pub fn with_ttl(mut self, secs: u64) -> Self {
        self.ttl = Some(secs);
        self
    }

    pub fn with_wait_all(mut self, wait_all: bool) -> Self {
        self.wait_all = Some(wait_all);
        self
    }

    // =========================================================================
    // Field accessors
    // =========================================================================

    /// Parse the action name; unknown names are `Forbidden`
    pub fn parse_action(&self) -> Result<Action> {
        self.action.parse()
    }

    pub fn id(&self) -> Result<&str> {
        self.id.as_deref().ok_or(CacheError::MissingField("id"))
    }

    pub fn address(&self) -> Result<&str> {
        self.address
            .as_deref()
            .ok_or(CacheError::MissingField("address"))
    }

    pub fn key(&self) -> Result<&str> {
        self.key.as_deref().ok_or(CacheError::MissingField("key"))
    }

    pub fn value(&self) -> Result<&[u8]> {
        self.value.as_deref().ok_or(CacheError::MissingField("value"))
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl.map(Duration::from_secs)
    }

    pub fn wait_all(&self) -> bool {
        self.wait_all.unwrap_or(true)
    }
}
