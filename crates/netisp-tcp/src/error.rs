//! Error types for the TCP transport

use std::io;
use thiserror::Error;

/// TCP transport errors
#[derive(Debug, Error)]
pub enum TcpError {
    /// Failed to bind the listening socket
    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        /// Requested listen address
        addr: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Failed to set a socket option
    #[error("Failed to configure socket: {0}")]
    ConfigFailed(#[source] io::Error),

    /// Accepting a connection failed
    #[error("Accept failed: {0}")]
    AcceptFailed(#[source] io::Error),

    /// I/O error on an established connection
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl embedded_io::Error for TcpError {
    fn kind(&self) -> embedded_io::ErrorKind {
        use embedded_io::ErrorKind;
        let TcpError::Io(e) = self else {
            return ErrorKind::Other;
        };
        match e.kind() {
            // Read timeouts surface as WouldBlock on Unix
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::TimedOut,
            io::ErrorKind::ConnectionReset => ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionAborted => ErrorKind::ConnectionAborted,
            io::ErrorKind::NotConnected => ErrorKind::NotConnected,
            io::ErrorKind::BrokenPipe => ErrorKind::BrokenPipe,
            io::ErrorKind::Interrupted => ErrorKind::Interrupted,
            _ => ErrorKind::Other,
        }
    }
}

impl From<TcpError> for netisp_core::Error {
    fn from(e: TcpError) -> Self {
        log::error!("tcp: {}", e);
        netisp_core::Error::Network
    }
}

/// Result type for TCP operations
pub type Result<T> = std::result::Result<T, TcpError>;

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error as _, ErrorKind};

    #[test]
    fn test_kind_mapping() {
        let kind = |k: io::ErrorKind| TcpError::Io(io::Error::from(k)).kind();
        assert_eq!(kind(io::ErrorKind::WouldBlock), ErrorKind::TimedOut);
        assert_eq!(kind(io::ErrorKind::TimedOut), ErrorKind::TimedOut);
        assert_eq!(kind(io::ErrorKind::ConnectionReset), ErrorKind::ConnectionReset);
        assert_eq!(kind(io::ErrorKind::BrokenPipe), ErrorKind::BrokenPipe);
        assert_eq!(kind(io::ErrorKind::PermissionDenied), ErrorKind::Other);
        let accept = TcpError::AcceptFailed(io::Error::from(io::ErrorKind::WouldBlock));
        assert_eq!(accept.kind(), ErrorKind::Other);
    }
}
