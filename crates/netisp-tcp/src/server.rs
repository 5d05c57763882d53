//! Non-blocking TCP listener and client sessions

use std::io::{self, Read as _, Write as _};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use embedded_io::{ErrorType, Read, ReadReady, Write};
use netisp_core::session::{Listener, Session};

use crate::error::{Result, TcpError};

/// Default port of network AVR ISP programmers
pub const DEFAULT_PORT: u16 = 328;

/// Default client read timeout in milliseconds
const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Default client write timeout in milliseconds
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1000;

/// Configuration for the listening socket and its sessions
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Listen address (e.g., "0.0.0.0:328")
    pub addr: String,
    /// How long a read waits for client data inside a frame
    pub read_timeout: Duration,
    /// How long a reply write may block
    pub write_timeout: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
        }
    }
}

impl TcpConfig {
    /// Create a configuration listening on `addr`
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Set the client read timeout in milliseconds
    pub fn with_read_timeout_ms(mut self, ms: u64) -> Self {
        self.read_timeout = Duration::from_millis(ms.max(1));
        self
    }

    /// Set the client write timeout in milliseconds
    pub fn with_write_timeout_ms(mut self, ms: u64) -> Self {
        self.write_timeout = Duration::from_millis(ms.max(1));
        self
    }
}

/// Listening socket handing out [`TcpSession`]s
pub struct TcpServer {
    listener: TcpListener,
    config: TcpConfig,
}

impl TcpServer {
    /// Bind the listening socket
    pub fn bind(config: &TcpConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.addr).map_err(|source| TcpError::BindFailed {
            addr: config.addr.clone(),
            source,
        })?;
        listener
            .set_nonblocking(true)
            .map_err(TcpError::ConfigFailed)?;
        log::info!("tcp: listening on {}", config.addr);
        Ok(Self {
            listener,
            config: config.clone(),
        })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one pending connection, `None` when nothing is waiting
    pub fn try_accept(&mut self) -> Result<Option<TcpSession>> {
        match self.listener.accept() {
            Ok((stream, peer)) => Ok(Some(TcpSession::new(stream, peer, &self.config)?)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(TcpError::AcceptFailed(e)),
        }
    }
}

impl Listener for TcpServer {
    type Session = TcpSession;

    fn accept(&mut self) -> netisp_core::Result<Option<TcpSession>> {
        Ok(self.try_accept()?)
    }
}

/// A connected client
pub struct TcpSession {
    stream: TcpStream,
    peer: SocketAddr,
    closed: bool,
}

impl TcpSession {
    fn new(stream: TcpStream, peer: SocketAddr, config: &TcpConfig) -> Result<Self> {
        // Accepted sockets must block, bounded by the timeouts below
        stream
            .set_nonblocking(false)
            .map_err(TcpError::ConfigFailed)?;
        stream.set_nodelay(true).map_err(TcpError::ConfigFailed)?;
        stream
            .set_read_timeout(Some(config.read_timeout))
            .map_err(TcpError::ConfigFailed)?;
        stream
            .set_write_timeout(Some(config.write_timeout))
            .map_err(TcpError::ConfigFailed)?;
        log::debug!("tcp: connection from {}", peer);
        Ok(Self {
            stream,
            peer,
            closed: false,
        })
    }

    /// Remote address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Peek one byte without blocking
    ///
    /// `Ok(None)` means no data is waiting, `Ok(Some(0))` means the peer
    /// closed its side.
    fn peek(&mut self) -> io::Result<Option<usize>> {
        let mut probe = [0u8; 1];
        self.stream.set_nonblocking(true)?;
        let result = self.stream.peek(&mut probe);
        self.stream.set_nonblocking(false)?;
        match result {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl ErrorType for TcpSession {
    type Error = TcpError;
}

impl Read for TcpSession {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.stream.read(buf)?)
    }
}

impl ReadReady for TcpSession {
    fn read_ready(&mut self) -> Result<bool> {
        // End of stream counts as ready so the next read reports it
        Ok(self.peek()?.is_some())
    }
}

impl Write for TcpSession {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.stream.write(buf)?)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.stream.flush()?)
    }
}

impl Session for TcpSession {
    fn is_connected(&mut self) -> bool {
        if self.closed {
            return false;
        }
        match self.peek() {
            Ok(Some(0)) => false,
            Ok(_) => true,
            Err(e) => {
                log::debug!("tcp: {} went away: {}", self.peer, e);
                false
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            log::debug!("tcp: shutdown of {} failed: {}", self.peer, e);
        }
        log::debug!("tcp: closed connection to {}", self.peer);
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        self.close();
    }
}
