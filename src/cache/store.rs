//! CacheStore implementation
//!
//! Two HashMaps: one for values, one for expiry timestamps.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{Clock, Snapshot, SystemClock};

/// In-memory key/value store with optional per-key expiry
pub struct CacheStore {
    /// Resident values
    entries: HashMap<String, Vec<u8>>,

    /// Absolute expiry (unix millis) for keys set with a TTL
    expirations: HashMap<String, u64>,

    clock: Arc<dyn Clock>,
}

impl CacheStore {
    /// Create an empty store backed by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store reading time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            expirations: HashMap::new(),
            clock,
        }
    }

    /// Insert or overwrite a key
    ///
    /// With a TTL the key expires at `now + ttl`. Without one, any expiry
    /// left over from an earlier write of the same key is cleared.
    pub fn set(&mut self, key: impl Into<String>, value: Vec<u8>, ttl: Option<Duration>) {
        let key = key.into();
        match ttl {
            Some(ttl) => {
                let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
                let expires_at = self.clock.now_ms().saturating_add(ttl_ms);
                self.expirations.insert(key.clone(), expires_at);
            }
            None => {
                self.expirations.remove(&key);
            }
        }
        self.entries.insert(key, value);
    }

    /// Read a key, purging it first if it has expired
    pub fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        if self.is_expired(key) {
            tracing::trace!("Evicting expired key {}", key);
            self.remove(key);
            return None;
        }
        self.entries.get(key).cloned()
    }

    /// Delete a key and its expiry record
    ///
    /// Returns whether the key was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.expirations.remove(key);
        self.entries.remove(key).is_some()
    }

    /// Copy the current contents
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self.entries.clone(),
            expirations: self.expirations.clone(),
        }
    }

    /// Load a snapshot
    ///
    /// With `merge == false` the store's contents are replaced. With
    /// `merge == true` the snapshot is laid over the existing entries and
    /// wins on key collisions.
    pub fn replay(&mut self, snapshot: Snapshot, merge: bool) {
        if !merge {
            self.entries = snapshot.entries;
            self.expirations = snapshot.expirations;
            return;
        }

        for key in snapshot.entries.keys() {
            if !snapshot.expirations.contains_key(key) {
                self.expirations.remove(key);
            }
        }
        self.entries.extend(snapshot.entries);
        self.expirations.extend(snapshot.expirations);
    }

    // =========================================================================
    // Inspection (no eviction side effects)
    // =========================================================================

    /// Whether `key` is physically stored, expired or not
    pub fn is_resident(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Expiry timestamp of `key`, if it has one
    pub fn expires_at(&self, key: &str) -> Option<u64> {
        self.expirations.get(key).copied()
    }

    /// Number of resident entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, key: &str) -> bool {
        self.expirations
            .get(key)
            .is_some_and(|&expires_at| self.clock.now_ms() >= expires_at)
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.entries.len())
            .field("expirations", &self.expirations.len())
            .finish()
    }
}
