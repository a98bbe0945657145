//! Node registry
//!
//! Ordered membership list. Insertion order is kept; the position of a
//! member is its ordinal, not its shard. Shard ownership is recomputed from
//! the current length on every lookup.

use super::member::Member;
use crate::error::{CacheError, Result};
use crate::node::NodeId;
use crate::ring::HashRing;

#[derive(Debug, Default)]
pub struct Registry {
    /// Unique identities in registration order
    members: Vec<Member>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn position(&self, id: &NodeId) -> Option<usize> {
        self.members.iter().position(|m| m.id() == id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.position(id).is_some()
    }

    /// Add a member, or replace the record of an identity already present
    ///
    /// Returns the member's ordinal and the replaced record, if any.
    pub fn insert(&mut self, member: Member) -> (usize, Option<Member>) {
        match self.position(member.id()) {
            Some(pos) => {
                let previous = std::mem::replace(&mut self.members[pos], member);
                (pos, Some(previous))
            }
            None => {
                self.members.push(member);
                (self.members.len() - 1, None)
            }
        }
    }

    pub fn remove(&mut self, id: &NodeId) -> Option<Member> {
        let pos = self.position(id)?;
        Some(self.members.remove(pos))
    }

    /// Remove `id` only if it is still the given registration
    pub fn remove_generation(&mut self, id: &NodeId, generation: u64) -> Option<Member> {
        let pos = self
            .members
            .iter()
            .position(|m| m.id() == id && m.generation() == generation)?;
        Some(self.members.remove(pos))
    }

    /// First member other than `id`
    pub fn peer_of(&self, id: &NodeId) -> Option<Member> {
        self.members.iter().find(|m| m.id() != id).cloned()
    }

    /// Member owning `key` under the current membership size
    pub fn owner(&self, key: &str, replicas_per_shard: usize) -> Result<Member> {
        if self.members.is_empty() {
            return Err(CacheError::ZeroNodes);
        }
        let ring = HashRing::new(self.members.len(), replicas_per_shard)?;
        self.members
            .get(ring.get_machine(key))
            .cloned()
            .ok_or(CacheError::ZeroNodes)
    }

    /// Stable copy of the membership for iteration outside the lock
    pub fn members(&self) -> Vec<Member> {
        self.members.clone()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.members.iter().map(|m| m.id().clone()).collect()
    }
}
