//! # ShardCache
//!
//! A distributed in-memory key-value cache:
//! - Storage nodes holding TTL-aware key/value maps
//! - A broker routing each key to one node by consistent hashing
//! - Writes replicated to every node, with per-request durability
//!   (`wait_all`) choosing between waiting for all nodes or just the owner
//! - New nodes bootstrapped from a snapshot of an existing node
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Clients                              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ get / set / remove
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Broker                               │
//! │        registry ── HashRing ── per-node delivery queues      │
//! └──────┬──────────────────────┬──────────────────────┬────────┘
//!        │ primary              │ secondary            │ secondary
//!        ▼                      ▼                      ▼
//!   ┌─────────┐            ┌─────────┐            ┌─────────┐
//!   │  Node   │            │  Node   │            │  Node   │
//!   │ (store) │            │ (store) │            │ (store) │
//!   └─────────┘            └─────────┘            └─────────┘
//! ```
//!
//! Nodes register with the broker on startup and unregister on shutdown.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod ring;
pub mod cache;
pub mod protocol;
pub mod network;
pub mod node;
pub mod broker;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CacheError, Result};
pub use config::Config;
pub use ring::HashRing;
pub use cache::{CacheStore, Snapshot};
pub use node::{Node, NodeId, NodeState};
pub use broker::Broker;
pub use client::Client;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ShardCache
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
