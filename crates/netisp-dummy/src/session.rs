//! In-memory client connections
//!
//! [`DummyListener::connect`] queues a [`DummySession`] for the programmer
//! to accept and hands back the [`DummyClient`] end of the same pipe.

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write};
use netisp_core::error::Result;
use netisp_core::session::{Listener, Session};

#[derive(Debug, Default)]
struct Pipe {
    to_target: VecDeque<u8>,
    to_client: Vec<u8>,
    client_closed: bool,
    server_closed: bool,
}

/// Client end of an in-memory connection
#[derive(Debug, Clone)]
pub struct DummyClient {
    pipe: Rc<RefCell<Pipe>>,
}

impl DummyClient {
    /// Queue bytes for the programmer
    pub fn send(&self, bytes: &[u8]) {
        self.pipe.borrow_mut().to_target.extend(bytes.iter().copied());
    }

    /// Take everything the programmer has written so far
    pub fn take_output(&self) -> Vec<u8> {
        core::mem::take(&mut self.pipe.borrow_mut().to_client)
    }

    /// Bytes sent but not yet read by the programmer
    pub fn pending(&self) -> usize {
        self.pipe.borrow().to_target.len()
    }

    /// Hang up
    pub fn disconnect(&self) {
        self.pipe.borrow_mut().client_closed = true;
    }

    /// Whether the programmer closed the connection
    pub fn is_closed(&self) -> bool {
        self.pipe.borrow().server_closed
    }
}

/// Programmer end of an in-memory connection
///
/// Reads time out instead of blocking when the client has nothing queued.
#[derive(Debug)]
pub struct DummySession {
    pipe: Rc<RefCell<Pipe>>,
}

impl ErrorType for DummySession {
    type Error = ErrorKind;
}

impl Read for DummySession {
    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, ErrorKind> {
        let mut pipe = self.pipe.borrow_mut();
        if pipe.server_closed {
            return Err(ErrorKind::NotConnected);
        }
        if pipe.to_target.is_empty() {
            return if pipe.client_closed {
                Ok(0)
            } else {
                Err(ErrorKind::TimedOut)
            };
        }
        let n = buf.len().min(pipe.to_target.len());
        for (slot, byte) in buf.iter_mut().zip(pipe.to_target.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl ReadReady for DummySession {
    fn read_ready(&mut self) -> core::result::Result<bool, ErrorKind> {
        let pipe = self.pipe.borrow();
        Ok(!pipe.to_target.is_empty() || pipe.client_closed)
    }
}

impl Write for DummySession {
    fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, ErrorKind> {
        let mut pipe = self.pipe.borrow_mut();
        if pipe.client_closed || pipe.server_closed {
            return Err(ErrorKind::BrokenPipe);
        }
        pipe.to_client.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> core::result::Result<(), ErrorKind> {
        Ok(())
    }
}

impl Session for DummySession {
    fn is_connected(&mut self) -> bool {
        let pipe = self.pipe.borrow();
        // Data sent before hanging up is still served
        !pipe.server_closed && (!pipe.client_closed || !pipe.to_target.is_empty())
    }

    fn close(&mut self) {
        let mut pipe = self.pipe.borrow_mut();
        pipe.server_closed = true;
        pipe.to_target.clear();
    }
}

/// Listener handing out in-memory sessions
#[derive(Debug, Default)]
pub struct DummyListener {
    queue: VecDeque<DummySession>,
    accepted: usize,
}

impl DummyListener {
    /// Create a listener with no pending connections
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection; the programmer sees it on its next accept
    pub fn connect(&mut self) -> DummyClient {
        let pipe = Rc::new(RefCell::new(Pipe::default()));
        self.queue.push_back(DummySession {
            pipe: Rc::clone(&pipe),
        });
        DummyClient { pipe }
    }

    /// Number of connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted
    }
}

impl Listener for DummyListener {
    type Session = DummySession;

    fn accept(&mut self) -> Result<Option<DummySession>> {
        let session = self.queue.pop_front();
        if session.is_some() {
            self.accepted += 1;
        }
        Ok(session)
    }
}
