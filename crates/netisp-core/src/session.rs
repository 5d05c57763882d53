//! Client sessions and the single-client connection manager
//!
//! A [`Listener`] hands out [`Session`]s; the [`ConnectionManager`] keeps at
//! most one of them and turns every other incoming connection away as soon
//! as it is seen.

use embedded_io::{Read, ReadReady, Write};

use crate::error::Result;

/// A connected client
///
/// Reads may block until data arrives or the transport's read timeout
/// expires; `read_ready` must not block.
pub trait Session: Read + Write + ReadReady {
    /// Whether the peer is still connected
    fn is_connected(&mut self) -> bool;

    /// Close the connection
    fn close(&mut self);
}

/// Source of incoming sessions
pub trait Listener {
    /// Session type produced by this listener
    type Session: Session;

    /// Accept a pending connection without blocking
    fn accept(&mut self) -> Result<Option<Self::Session>>;
}

/// Owns the listener and at most one active session
pub struct ConnectionManager<L: Listener> {
    listener: L,
    session: Option<L::Session>,
    rejected: u32,
}

impl<L: Listener> ConnectionManager<L> {
    /// Create a manager around `listener`
    pub fn new(listener: L) -> Self {
        Self {
            listener,
            session: None,
            rejected: 0,
        }
    }

    /// Accept a new session if none is held
    ///
    /// Returns true when a session was accepted by this call.
    pub fn poll_accept(&mut self) -> Result<bool> {
        if self.session.is_some() {
            return Ok(false);
        }
        match self.listener.accept()? {
            Some(session) => {
                log::info!("session: client connected");
                self.session = Some(session);
                self.reject_incoming()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Check the held session; drops it when the peer went away
    ///
    /// Returns true while a live session is held. Connections queued behind
    /// a live session are rejected.
    pub fn check(&mut self) -> Result<bool> {
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };
        if !session.is_connected() {
            log::info!("session: client disconnected");
            self.drop_session();
            return Ok(false);
        }
        self.reject_incoming()?;
        Ok(true)
    }

    /// Close every connection waiting on the listener
    pub fn reject_incoming(&mut self) -> Result<usize> {
        let mut count = 0;
        while let Some(mut extra) = self.listener.accept()? {
            extra.close();
            count += 1;
        }
        if count > 0 {
            self.rejected += count as u32;
            log::warn!("session: rejected {} connection(s) while busy", count);
        }
        Ok(count)
    }

    /// Close and forget the held session
    pub fn drop_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }

    /// The held session
    pub fn session_mut(&mut self) -> Option<&mut L::Session> {
        self.session.as_mut()
    }

    /// Whether a session is held
    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Number of connections turned away so far
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    /// Get a reference to the listener
    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Get a mutable reference to the listener
    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }
}
