//! Request framing and reply encoding
//!
//! Two framings are supported:
//!
//! - **Classic**: plain STK500v1 as spoken by avrdude. A request is
//!   `[cmd][args...][0x20]`, a reply `[0x14][payload...][0x10]`.
//! - **Sequenced**: every request is wrapped in
//!   `[0x1B][seq][len-hi][len-lo][body...][0x20]` and every reply is
//!   prefixed with the request's sequence number.

use crate::memory::PAGE_CAPACITY;

use super::protocol::*;

/// Largest reply payload (a full page read)
pub const PAYLOAD_CAPACITY: usize = PAGE_CAPACITY;
/// Largest encoded reply: sequence number, INSYNC, payload, OK
pub const FRAME_CAPACITY: usize = PAYLOAD_CAPACITY + 3;
/// Largest accepted sequenced body: a page write with its header
pub const MAX_BODY: usize = PAGE_CAPACITY + 8;
/// Length of the sequenced envelope header after the start byte
pub const SEQ_HEADER_LEN: usize = 3;

/// Request framing spoken on the client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Plain STK500v1
    #[default]
    Classic,
    /// STK500v1 commands inside a sequence-numbered envelope
    Sequenced,
}

/// Non-OK reply status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command failed
    Failed,
    /// Command byte not recognized
    Unknown,
    /// Target not responding or not in programming mode
    NoDevice,
    /// Framing error
    NoSync,
}

impl Status {
    /// Protocol status byte
    pub fn byte(self) -> u8 {
        match self {
            Status::Failed => RESP_FAILED,
            Status::Unknown => RESP_UNKNOWN,
            Status::NoDevice => RESP_NODEVICE,
            Status::NoSync => RESP_NOSYNC,
        }
    }
}

/// Reply payload storage
pub type Payload = heapless::Vec<u8, PAYLOAD_CAPACITY>;

/// Outcome of one command, before framing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Command succeeded with an optional payload
    Ok(Payload),
    /// Command did not succeed
    Status(Status),
}

impl Reply {
    /// OK without payload
    pub fn empty() -> Self {
        Reply::Ok(Payload::new())
    }

    /// OK with a single byte
    pub fn byte(value: u8) -> Self {
        Self::from_slice(&[value])
    }

    /// OK with a copy of `bytes`
    pub fn from_slice(bytes: &[u8]) -> Self {
        match Payload::from_slice(bytes) {
            Ok(payload) => Reply::Ok(payload),
            Err(()) => Reply::Status(Status::Failed),
        }
    }

    /// Status reply
    pub fn status(status: Status) -> Self {
        Reply::Status(status)
    }

    /// Whether this is an OK reply
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok(_))
    }

    /// Encode for the wire
    ///
    /// `seq` is only used by the sequenced framing; `None` there means the
    /// envelope itself was unreadable and a bare status byte is sent.
    pub fn encode(&self, framing: Framing, seq: Option<u8>) -> Frame {
        let mut frame = Frame::new();
        match framing {
            Framing::Classic => match self {
                Reply::Ok(payload) => {
                    put(&mut frame, &[RESP_INSYNC]);
                    put(&mut frame, payload);
                    put(&mut frame, &[RESP_OK]);
                }
                Reply::Status(s @ (Status::Failed | Status::NoDevice)) => {
                    put(&mut frame, &[RESP_INSYNC, s.byte()]);
                }
                Reply::Status(s) => put(&mut frame, &[s.byte()]),
            },
            Framing::Sequenced => {
                if let Some(seq) = seq {
                    put(&mut frame, &[seq]);
                }
                match self {
                    Reply::Ok(payload) => {
                        put(&mut frame, &[RESP_INSYNC]);
                        put(&mut frame, payload);
                        put(&mut frame, &[RESP_OK]);
                    }
                    Reply::Status(s) => put(&mut frame, &[s.byte()]),
                }
            }
        }
        frame
    }
}

/// Encoded reply bytes
pub type Frame = heapless::Vec<u8, FRAME_CAPACITY>;

fn put(frame: &mut Frame, bytes: &[u8]) {
    // FRAME_CAPACITY holds a full payload plus every framing byte
    let _ = frame.extend_from_slice(bytes);
}
