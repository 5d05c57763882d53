//! netisp-tcp - TCP transport for the network programmer
//!
//! This crate provides the listening socket and client connections the
//! programmer serves STK500 over. The listener never blocks: the main loop
//! polls it once per tick. Client reads block for at most the configured
//! read timeout, so a stalled client cannot wedge the programmer.
//!
//! # Example
//!
//! ```no_run
//! use netisp_tcp::{TcpConfig, TcpServer};
//!
//! let server = TcpServer::bind(&TcpConfig::new("0.0.0.0:328"))?;
//! println!("listening on {}", server.local_addr()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Usage with avrdude
//!
//! ```bash
//! avrdude -c arduino -P net:192.168.1.20:328 -p m328p -U flash:w:blink.hex
//! ```

pub mod error;
pub mod server;

// Re-exports
pub use error::{Result, TcpError};
pub use server::{TcpConfig, TcpServer, TcpSession, DEFAULT_PORT};
