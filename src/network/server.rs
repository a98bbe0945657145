//! TCP Server
//!
//! Accepts connections and hands each one to its own thread.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::network::{Connection, Service};

/// How long the acceptor sleeps when no connection is pending
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// TCP server for a broker or node
pub struct Server {
    config: Config,
    service: Arc<dyn Service>,
    listener: Option<TcpListener>,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Create a new server with the given config and service
    pub fn new(config: Config, service: Arc<dyn Service>) -> Self {
        Self {
            config,
            service,
            listener: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind the listen address without accepting yet
    ///
    /// Returns the bound address, useful when listening on port 0.
    pub fn bind(&mut self) -> Result<SocketAddr> {
        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr()?);
        }
        let listener = TcpListener::bind(&self.config.listen_addr)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        tracing::info!("Listening on {}", addr);
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Start the server (blocking until shutdown is signalled)
    pub fn run(&mut self) -> Result<()> {
        self.bind()?;
        let Some(listener) = self.listener.take() else {
            return Ok(());
        };

        while !self.shutdown.load(Ordering::Relaxed) {
            let (stream, peer) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    continue;
                }
            };

            if self.active.load(Ordering::Relaxed) >= self.config.max_connections {
                tracing::warn!(
                    "Rejecting {}: {} connections already open",
                    peer,
                    self.config.max_connections
                );
                continue;
            }

            if let Err(e) = stream.set_nonblocking(false) {
                tracing::warn!("Cannot configure stream from {}: {}", peer, e);
                continue;
            }

            let service = Arc::clone(&self.service);
            let active = ActiveGuard::new(Arc::clone(&self.active));
            let write_timeout_ms = self.config.request_timeout_ms;
            let max_reply_bytes = self.config.max_reply_bytes;

            thread::spawn(move || {
                let _active = active;
                let result = Connection::new(stream, service).and_then(|mut conn| {
                    // Idle links are normal; only writes are bounded
                    conn.set_timeouts(0, write_timeout_ms)?;
                    conn.set_max_reply_bytes(max_reply_bytes);
                    conn.handle()
                });
                if let Err(e) = result {
                    tracing::debug!("Connection from {} ended with error: {}", peer, e);
                }
            });
        }

        tracing::info!("Server stopped accepting connections");
        Ok(())
    }

    /// Flag that stops the accept loop when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

/// Counts a connection as active for as long as it lives
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
