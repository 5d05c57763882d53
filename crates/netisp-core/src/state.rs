//! Programmer state machine
//!
//! ```text
//! IDLE --accept--> PENDING --enter progmode--> ACTIVE
//!   ^                 |  ^                        |
//!   |                 |  +----leave progmode------+
//!   +---disconnect----+---------------------------+
//! ```
//!
//! The machine only advances when the caller invokes [`Programmer::update`]
//! or [`Programmer::serve`], typically once per tick of a poll loop.

use crate::error::Result;
use crate::interpreter::Interpreter;
use crate::programmer::{IspBus, ResetLine};
use crate::session::{ConnectionManager, Listener};

/// Programmer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgrammerState {
    /// No client connected
    Idle,
    /// Client connected, bus not claimed
    Pending,
    /// Programming mode entered, bus claimed
    Active,
}

/// Network programmer: connection manager plus interpreter
pub struct Programmer<L: Listener, B, R> {
    connections: ConnectionManager<L>,
    interpreter: Interpreter<B, R>,
    state: ProgrammerState,
}

impl<L, B, R> Programmer<L, B, R>
where
    L: Listener,
    B: IspBus,
    R: ResetLine,
{
    /// Create an idle programmer
    pub fn new(listener: L, interpreter: Interpreter<B, R>) -> Self {
        Self {
            connections: ConnectionManager::new(listener),
            interpreter,
            state: ProgrammerState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> ProgrammerState {
        self.state
    }

    /// Get a reference to the interpreter
    pub fn interpreter(&self) -> &Interpreter<B, R> {
        &self.interpreter
    }

    /// Get a mutable reference to the interpreter
    pub fn interpreter_mut(&mut self) -> &mut Interpreter<B, R> {
        &mut self.interpreter
    }

    /// Get a reference to the connection manager
    pub fn connections(&self) -> &ConnectionManager<L> {
        &self.connections
    }

    /// Get a mutable reference to the connection manager
    pub fn connections_mut(&mut self) -> &mut ConnectionManager<L> {
        &mut self.connections
    }

    /// Accept a client when idle, otherwise check the client is still there
    pub fn update(&mut self) -> Result<ProgrammerState> {
        match self.state {
            ProgrammerState::Idle => {
                if self.connections.poll_accept()? {
                    self.interpreter.begin_session();
                    self.state = ProgrammerState::Pending;
                }
            }
            ProgrammerState::Pending | ProgrammerState::Active => {
                if self.connections.check()? {
                    self.state = if self.interpreter.in_progmode() {
                        ProgrammerState::Active
                    } else {
                        ProgrammerState::Pending
                    };
                } else {
                    self.interpreter.end_session();
                    self.state = ProgrammerState::Idle;
                    log::info!("programmer: idle");
                }
            }
        }
        Ok(self.state)
    }

    /// Update, then serve at most one command from the client
    ///
    /// Does not block when the client has nothing to say.
    pub fn serve(&mut self) -> Result<ProgrammerState> {
        if self.update()? == ProgrammerState::Idle {
            return Ok(ProgrammerState::Idle);
        }
        if let Some(session) = self.connections.session_mut() {
            match self.interpreter.serve(session) {
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    log::info!("programmer: dropping client: {}", e);
                    self.connections.drop_session();
                }
                Err(e) => log::warn!("programmer: {}", e),
            }
        }
        self.update()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::InterpreterConfig;
    use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write};
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// Echoes the previous byte, which is all Programming Enable checks
    #[derive(Default)]
    struct EchoBus {
        last: u8,
        claimed: bool,
    }

    impl IspBus for EchoBus {
        fn transfer(&mut self, byte: u8) -> Result<u8> {
            Ok(core::mem::replace(&mut self.last, byte))
        }

        fn delay_us(&mut self, _us: u32) {}

        fn claim(&mut self) -> Result<()> {
            self.claimed = true;
            Ok(())
        }

        fn release(&mut self) {
            self.claimed = false;
        }
    }

    #[derive(Default)]
    struct Line(bool);

    impl ResetLine for Line {
        fn set_level(&mut self, active: bool) -> Result<()> {
            self.0 = active;
            Ok(())
        }
    }

    struct Client {
        input: VecDeque<u8>,
        output: Vec<u8>,
        connected: bool,
        eof: bool,
    }

    impl Client {
        fn new() -> Self {
            Self {
                input: VecDeque::new(),
                output: Vec::new(),
                connected: true,
                eof: false,
            }
        }
    }

    impl ErrorType for Client {
        type Error = ErrorKind;
    }

    impl Read for Client {
        fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, ErrorKind> {
            if self.input.is_empty() {
                return if self.eof { Ok(0) } else { Err(ErrorKind::TimedOut) };
            }
            let n = buf.len().min(self.input.len());
            for (slot, b) in buf.iter_mut().zip(self.input.drain(..n)) {
                *slot = b;
            }
            Ok(n)
        }
    }

    impl ReadReady for Client {
        fn read_ready(&mut self) -> core::result::Result<bool, ErrorKind> {
            Ok(self.eof || !self.input.is_empty())
        }
    }

    impl Write for Client {
        fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, ErrorKind> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> core::result::Result<(), ErrorKind> {
            Ok(())
        }
    }

    impl crate::session::Session for Client {
        fn is_connected(&mut self) -> bool {
            self.connected
        }

        fn close(&mut self) {
            self.connected = false;
        }
    }

    #[derive(Default)]
    struct Queue(VecDeque<Client>);

    impl Listener for Queue {
        type Session = Client;

        fn accept(&mut self) -> Result<Option<Client>> {
            Ok(self.0.pop_front())
        }
    }

    fn programmer() -> Programmer<Queue, EchoBus, Line> {
        let interpreter =
            Interpreter::new(EchoBus::default(), Line::default(), InterpreterConfig::default())
                .unwrap();
        Programmer::new(Queue::default(), interpreter)
    }

    fn send(p: &mut Programmer<Queue, EchoBus, Line>, bytes: &[u8]) -> ProgrammerState {
        let client = p.connections_mut().session_mut().unwrap();
        client.input.extend(bytes.iter().copied());
        p.serve().unwrap()
    }

    #[test]
    fn test_idle_until_client_connects() {
        let mut p = programmer();
        assert_eq!(p.update().unwrap(), ProgrammerState::Idle);
        p.connections_mut().listener_mut().0.push_back(Client::new());
        assert_eq!(p.update().unwrap(), ProgrammerState::Pending);
        assert!(p.connections().has_session());
    }

    #[test]
    fn test_progmode_and_disconnect() {
        let mut p = programmer();
        p.connections_mut().listener_mut().0.push_back(Client::new());
        p.update().unwrap();

        assert_eq!(send(&mut p, &[0x50, 0x20]), ProgrammerState::Active);
        assert!(p.interpreter().bus().claimed);
        assert!(p.interpreter().reset().0);

        assert_eq!(send(&mut p, &[0x51, 0x20]), ProgrammerState::Pending);
        assert_eq!(send(&mut p, &[0x50, 0x20]), ProgrammerState::Active);

        p.connections_mut().session_mut().unwrap().connected = false;
        assert_eq!(p.update().unwrap(), ProgrammerState::Idle);
        assert!(!p.interpreter().bus().claimed);
        assert!(!p.interpreter().reset().0);
        assert!(!p.connections().has_session());
    }

    #[test]
    fn test_second_client_rejected() {
        let mut p = programmer();
        p.connections_mut().listener_mut().0.push_back(Client::new());
        p.update().unwrap();

        p.connections_mut().listener_mut().0.push_back(Client::new());
        assert_eq!(p.update().unwrap(), ProgrammerState::Pending);
        assert_eq!(p.connections().rejected(), 1);
        assert!(p.connections().listener().0.is_empty());

        assert_eq!(send(&mut p, &[0x30, 0x20]), ProgrammerState::Pending);
        assert_eq!(p.connections_mut().session_mut().unwrap().output, [0x14, 0x10]);
    }

    #[test]
    fn test_end_of_stream_drops_client() {
        let mut p = programmer();
        p.connections_mut().listener_mut().0.push_back(Client::new());
        p.update().unwrap();
        send(&mut p, &[0x50, 0x20]);

        p.connections_mut().session_mut().unwrap().eof = true;
        assert_eq!(p.serve().unwrap(), ProgrammerState::Idle);
        assert!(!p.interpreter().in_progmode());
    }

    #[test]
    fn test_new_session_resets_error_count() {
        let mut p = programmer();
        p.connections_mut().listener_mut().0.push_back(Client::new());
        p.update().unwrap();
        send(&mut p, &[0x20]);
        assert_eq!(p.interpreter().error_count(), 1);

        p.connections_mut().session_mut().unwrap().connected = false;
        p.update().unwrap();
        p.connections_mut().listener_mut().0.push_back(Client::new());
        p.update().unwrap();
        assert_eq!(p.interpreter().error_count(), 0);
    }
}
