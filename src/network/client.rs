//! TCP Links
//!
//! Outbound request/reply channels over TCP.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::network::{Connector, Link};
use crate::protocol::{read_reply, write_request, Reply, Request};

/// An open TCP connection split into buffered halves
struct Stream {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

/// Request/reply link to one remote address
///
/// One request is in flight at a time. After an I/O failure the connection
/// is dropped and the next call dials again; the failed call itself is not
/// retried. Once closed, the link stays closed.
pub struct TcpLink {
    address: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    stream: Mutex<Option<Stream>>,
    closed: AtomicBool,
}

impl TcpLink {
    /// Create a link that dials on first use
    pub fn new(address: impl Into<String>, config: &Config) -> Self {
        Self {
            address: address.into(),
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            stream: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Connect to `address` eagerly
    pub fn connect(address: impl Into<String>, config: &Config) -> Result<Self> {
        let link = Self::new(address, config);
        let stream = link.open()?;
        *link.stream.lock() = Some(stream);
        Ok(link)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn open(&self) -> Result<Stream> {
        let addr = self
            .address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| CacheError::Unreachable(self.address.clone()))?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|e| self.classify(CacheError::Io(e)))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.request_timeout))?;
        stream.set_write_timeout(Some(self.request_timeout))?;

        tracing::debug!("Connected to {}", self.address);
        Ok(Stream {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        })
    }

    /// Map socket-level failures onto reachability errors
    fn classify(&self, err: CacheError) -> CacheError {
        let CacheError::Io(ref io_err) = err else {
            return err;
        };
        match io_err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => CacheError::Timeout(self.address.clone()),
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => CacheError::Unreachable(self.address.clone()),
            _ => err,
        }
    }
}

impl Link for TcpLink {
    fn call(&self, request: &Request) -> Result<Reply> {
        let mut guard = self.stream.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Unreachable(self.address.clone()));
        }
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        let Some(stream) = guard.as_mut() else {
            return Err(CacheError::Unreachable(self.address.clone()));
        };

        let result = write_request(&mut stream.writer, request)
            .and_then(|_| read_reply(&mut stream.reader));

        match result {
            Ok(reply) => Ok(reply),
            Err(e) => {
                *guard = None;
                Err(self.classify(e))
            }
        }
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        if let Some(stream) = self.stream.lock().take() {
            match stream.writer.get_ref().shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotConnected => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Opens `TcpLink`s using timeouts from a `Config`
#[derive(Debug, Clone)]
pub struct TcpConnector {
    config: Config,
}

impl TcpConnector {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl Connector for TcpConnector {
    fn connect(&self, address: &str) -> Result<Arc<dyn Link>> {
        Ok(Arc::new(TcpLink::connect(address, &self.config)?))
    }
}
