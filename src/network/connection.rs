//! Connection Handler
//!
//! Handles individual inbound connections.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CacheError, Result};
use crate::network::Service;
use crate::protocol::{
    decode_payload, read_frame, write_reply_limited, Reply, Request, MAX_REPLY_SIZE,
};

/// Handles a single inbound connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Service answering the requests
    service: Arc<dyn Service>,

    /// Peer address for logging
    peer_addr: String,

    /// Replies larger than this are answered with an error instead
    max_reply_bytes: u32,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(stream: TcpStream, service: Arc<dyn Service>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            service,
            peer_addr,
            max_reply_bytes: MAX_REPLY_SIZE,
        })
    }

    /// Cap the payload size of replies sent on this connection
    pub fn set_max_reply_bytes(&mut self, bytes: u32) {
        self.max_reply_bytes = bytes;
    }

    /// Configure connection timeouts; zero leaves a direction unbounded
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads requests in a loop and sends replies. A payload that fails to
    /// decode, or a reply that cannot be encoded, gets an error reply and
    /// the loop continues; a broken frame gets an error reply and ends the
    /// connection.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let payload = match read_frame(&mut self.reader) {
                Ok(payload) => payload,
                Err(CacheError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    let _ = self.send_reply(&Reply::from_error(&e));
                    return Err(e);
                }
            };

            let reply = match decode_payload::<Request>(&payload) {
                Ok(request) => {
                    tracing::trace!("Received request from {}: {:?}", self.peer_addr, request);
                    self.service.handle(request)
                }
                Err(e) => {
                    tracing::warn!("Undecodable request from {}: {}", self.peer_addr, e);
                    Reply::from_error(&e)
                }
            };

            let sent = match self.send_reply(&reply) {
                // Nothing was written, so the stream is still in sync
                Err(e @ CacheError::Protocol(_)) => {
                    tracing::warn!("Cannot send reply to {}: {}", self.peer_addr, e);
                    self.send_reply(&Reply::from_error(&e))
                }
                other => other,
            };

            if let Err(e) = sent {
                if let CacheError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) || io_err.kind() == ErrorKind::BrokenPipe {
                        tracing::debug!(
                            "Client {} disconnected before reply could be sent: {}",
                            self.peer_addr,
                            e
                        );
                        return Ok(());
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    fn send_reply(&mut self, reply: &Reply) -> Result<()> {
        write_reply_limited(&mut self.writer, reply, self.max_reply_bytes)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    )
}
