//! Network Module
//!
//! Request/reply transport between clients, the broker and nodes.
//!
//! ## Architecture
//! - `Server`: single acceptor thread, one thread per connection,
//!   each request handed to a `Service` (broker or node)
//! - `Link`: one request/reply channel to a remote service
//! - `Connector`: opens links by address
//!
//! Two transports implement the seams: TCP (`TcpLink`, `TcpConnector`) and
//! in-process (`LocalLink`, `LocalConnector`), which runs a whole cluster
//! inside one process.

mod server;
mod connection;
mod client;
mod local;

use std::sync::Arc;

use crate::error::Result;
use crate::protocol::{Reply, Request};

pub use server::Server;
pub use connection::Connection;
pub use client::{TcpConnector, TcpLink};
pub use local::{LocalConnector, LocalLink};

/// Something that answers requests
///
/// Implementations never fail at this level: every error is folded into
/// a `Reply::Error`.
pub trait Service: Send + Sync + 'static {
    fn handle(&self, request: Request) -> Reply;
}

/// A request/reply channel to one remote service
pub trait Link: Send + Sync {
    /// Send a request and wait for its reply
    fn call(&self, request: &Request) -> Result<Reply>;

    /// Release the channel; later calls fail
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Opens links by address
pub trait Connector: Send + Sync {
    fn connect(&self, address: &str) -> Result<Arc<dyn Link>>;
}
