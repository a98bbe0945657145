//! Cache Module
//!
//! Per-node TTL-aware key/value store.
//!
//! ## Responsibilities
//! - Insert, overwrite, read and remove keys
//! - Record absolute expiry timestamps (unix millis) for keys set with a TTL
//! - Lazy eviction: an expired key is purged when it is read
//! - Full point-in-time snapshots and replay, used to bootstrap a joining node
//!
//! The store is owned by exactly one node and is not internally synchronized;
//! the node serializes access to it.

mod clock;
mod store;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::CacheStore;

/// Full copy of one store's state
///
/// Entries and expirations reflect the same instant. Writes landing on the
/// source node after the copy is taken are not included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Every resident key/value pair
    pub entries: HashMap<String, Vec<u8>>,

    /// Absolute expiry (unix millis) of keys that carry a TTL
    pub expirations: HashMap<String, u64>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
