//! Consistent Hash Ring
//!
//! Maps a key onto the index of the shard that owns it.
//!
//! ## Algorithm
//! ```text
//!   0.0                                                        1.0
//!    ├───●────────○──────●──────────●───○─────────●──────────┤
//!        s0r1     key    s2r0       s1r1          s0r0
//!                  └────► owner = s2 (first position at or after key)
//! ```
//! - Every shard `i` gets `replicas_per_shard` virtual positions, each the
//!   unit-interval hash of the label `"{i}-{replica}"`.
//! - A key is hashed into the same interval and owned by the shard of the
//!   first virtual position at or after it, wrapping to the smallest one.
//!
//! Positions come from XXH64 with a fixed seed, so the mapping is identical
//! across processes and restarts. Adding a shard only moves keys onto the
//! new shard; the positions of existing shards never change.

use xxhash_rust::xxh64::xxh64;

use crate::error::{CacheError, Result};

/// Fixed seed for every ring hash
const RING_SEED: u64 = 0;

/// Hash a string into `[0, 1)`
///
/// Uses the top 53 bits of XXH64 so every value is exactly representable
/// as an `f64` and the result is strictly below 1.0.
pub fn hash_unit(value: &str) -> f64 {
    let hash = xxh64(value.as_bytes(), RING_SEED) >> 11;
    hash as f64 / (1u64 << 53) as f64
}

/// Sorted ring of virtual positions for a fixed shard count
#[derive(Debug, Clone)]
pub struct HashRing {
    shard_count: usize,
    replicas_per_shard: usize,

    /// (position, shard index), sorted by position
    positions: Vec<(f64, usize)>,
}

impl HashRing {
    /// Build the ring for `shard_count` shards with `replicas_per_shard`
    /// virtual positions each.
    ///
    /// Both counts must be positive.
    pub fn new(shard_count: usize, replicas_per_shard: usize) -> Result<Self> {
        if shard_count == 0 {
            return Err(CacheError::Config(
                "shard count must be greater than zero".to_string(),
            ));
        }
        if replicas_per_shard == 0 {
            return Err(CacheError::Config(
                "replicas per shard must be greater than zero".to_string(),
            ));
        }

        let mut positions = Vec::with_capacity(shard_count * replicas_per_shard);
        for shard in 0..shard_count {
            for replica in 0..replicas_per_shard {
                let label = format!("{}-{}", shard, replica);
                positions.push((hash_unit(&label), shard));
            }
        }
        positions.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        Ok(Self {
            shard_count,
            replicas_per_shard,
            positions,
        })
    }

    /// Index of the shard owning `key`
    pub fn get_machine(&self, key: &str) -> usize {
        let point = hash_unit(key);
        let idx = self.positions.partition_point(|(pos, _)| *pos < point);

        // Past the last position: wrap around to the first one
        self.positions
            .get(idx)
            .or_else(|| self.positions.first())
            .map_or(0, |&(_, shard)| shard)
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    pub fn replicas_per_shard(&self) -> usize {
        self.replicas_per_shard
    }

    /// Total number of virtual positions on the ring
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
