//! Command parsing
//!
//! A request is parsed completely into a [`Command`] before anything is
//! executed, so a bad terminator never leaves half-applied side effects.
//! The only state touched while parsing is the buffer handed in, which
//! receives the data of a program page command.

use crate::error::{Error, Result};
use crate::memory::{PageBuffer, PAGE_CAPACITY};

use super::params::{ExtendedParameters, SET_DEVICE_LEN};
use super::protocol::*;

/// Source of request bytes
///
/// Implemented by the interpreter over the client stream (classic
/// framing) and by [`SliceSource`] over an already received body
/// (sequenced framing).
pub trait ByteSource {
    /// Read the next byte
    fn next_byte(&mut self) -> Result<u8>;

    /// Fill `buf` completely
    fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        for b in buf.iter_mut() {
            *b = self.next_byte()?;
        }
        Ok(())
    }

    /// Discard `n` bytes
    fn skip(&mut self, n: usize) -> Result<()> {
        for _ in 0..n {
            self.next_byte()?;
        }
        Ok(())
    }

    /// Bytes left in the current frame, when the framing knows it
    fn remaining(&self) -> Option<usize> {
        None
    }
}

/// Byte source over a received frame body
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// Create a source over `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl ByteSource for SliceSource<'_> {
    fn next_byte(&mut self) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or(Error::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.data.len() - self.pos)
    }
}

/// Memory selected by a page command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Memory {
    /// Program memory ('F')
    Flash,
    /// Data EEPROM ('E')
    Eeprom,
}

impl Memory {
    /// Decode a memory type byte
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            MEMTYPE_FLASH => Some(Memory::Flash),
            MEMTYPE_EEPROM => Some(Memory::Eeprom),
            _ => None,
        }
    }
}

/// A parsed STK500 request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Get synchronization
    GetSync,
    /// Get sign-on string
    GetSignOn,
    /// Set a programmer parameter
    SetParameter {
        /// Parameter id
        id: u8,
        /// New value
        value: u8,
    },
    /// Get a parameter
    GetParameter(u8),
    /// Set device parameters (raw payload, validated on execution)
    SetDevice([u8; SET_DEVICE_LEN]),
    /// Set extended device parameters
    SetDeviceExt(ExtendedParameters),
    /// Enter programming mode
    EnterProgmode,
    /// Leave programming mode
    LeaveProgmode,
    /// Chip erase
    ChipErase,
    /// Load the memory cursor (word address)
    LoadAddress(u32),
    /// Raw 4-byte instruction
    Universal([u8; 4]),
    /// Program one flash word at the cursor
    ProgFlash {
        /// Low byte
        low: u8,
        /// High byte
        high: u8,
    },
    /// Program one EEPROM byte at the cursor
    ProgData(u8),
    /// Program low and high fuse
    ProgFuse {
        /// Low fuse
        low: u8,
        /// High fuse
        high: u8,
    },
    /// Program lock bits
    ProgLock(u8),
    /// Program `len` bytes staged in the page buffer
    ProgPage {
        /// Target memory, `None` for an unknown type byte
        memory: Option<Memory>,
        /// Number of bytes
        len: usize,
    },
    /// Program all three fuses
    ProgFuseExt {
        /// Low fuse
        low: u8,
        /// High fuse
        high: u8,
        /// Extended fuse
        ext: u8,
    },
    /// Read one flash word at the cursor
    ReadFlash,
    /// Read one EEPROM byte at the cursor
    ReadData,
    /// Read low and high fuse
    ReadFuse,
    /// Read lock bits
    ReadLock,
    /// Read `len` bytes at the cursor
    ReadPage {
        /// Source memory, `None` for an unknown type byte
        memory: Option<Memory>,
        /// Number of bytes
        len: usize,
    },
    /// Read signature bytes
    ReadSign,
    /// Read calibration byte
    ReadOscCal,
    /// Read all three fuses
    ReadFuseExt,
    /// A page command whose length exceeds the page buffer
    Oversized(usize),
    /// Unrecognized command byte
    Unknown(u8),
}

impl Command {
    /// Parse the arguments of command byte `cmd` from `src`
    ///
    /// Program page data is written to `buffer`. An oversized program page
    /// is consumed from the stream without touching the buffer. The frame
    /// terminator is left for the caller.
    pub fn parse<S: ByteSource + ?Sized>(
        cmd: u8,
        src: &mut S,
        buffer: &mut PageBuffer,
    ) -> Result<Command> {
        let command = match cmd {
            CMD_GET_SYNC => Command::GetSync,
            CMD_GET_SIGN_ON => Command::GetSignOn,
            CMD_SET_PARAMETER => Command::SetParameter {
                id: src.next_byte()?,
                value: src.next_byte()?,
            },
            CMD_GET_PARAMETER => Command::GetParameter(src.next_byte()?),
            CMD_SET_DEVICE => {
                let mut raw = [0u8; SET_DEVICE_LEN];
                src.read_into(&mut raw)?;
                Command::SetDevice(raw)
            }
            CMD_SET_DEVICE_EXT => {
                // Count includes itself
                let extra = (src.next_byte()? as usize).saturating_sub(1);
                let mut raw = [0u8; 4];
                let keep = extra.min(raw.len());
                src.read_into(&mut raw[..keep])?;
                src.skip(extra - keep)?;
                Command::SetDeviceExt(ExtendedParameters::parse(&raw[..keep]))
            }
            CMD_ENTER_PROGMODE => Command::EnterProgmode,
            CMD_LEAVE_PROGMODE => Command::LeaveProgmode,
            CMD_CHIP_ERASE => Command::ChipErase,
            CMD_LOAD_ADDRESS => {
                if src.remaining() == Some(4) {
                    let mut raw = [0u8; 4];
                    src.read_into(&mut raw)?;
                    // Bit 31 flags an extended address, not part of the cursor
                    Command::LoadAddress(u32::from_be_bytes(raw) & 0x7FFF_FFFF)
                } else {
                    let lo = src.next_byte()?;
                    let hi = src.next_byte()?;
                    Command::LoadAddress(u16::from_le_bytes([lo, hi]) as u32)
                }
            }
            CMD_UNIVERSAL => {
                let mut raw = [0u8; 4];
                src.read_into(&mut raw)?;
                Command::Universal(raw)
            }
            CMD_PROG_FLASH => Command::ProgFlash {
                low: src.next_byte()?,
                high: src.next_byte()?,
            },
            CMD_PROG_DATA => Command::ProgData(src.next_byte()?),
            CMD_PROG_FUSE => Command::ProgFuse {
                low: src.next_byte()?,
                high: src.next_byte()?,
            },
            CMD_PROG_LOCK => Command::ProgLock(src.next_byte()?),
            CMD_PROG_PAGE => {
                let (len, memory) = page_header(src)?;
                match buffer.fill_with(len, || src.next_byte()) {
                    Ok(()) => Command::ProgPage { memory, len },
                    Err(Error::Oversized) => {
                        src.skip(len)?;
                        Command::Oversized(len)
                    }
                    Err(e) => return Err(e),
                }
            }
            CMD_PROG_FUSE_EXT => Command::ProgFuseExt {
                low: src.next_byte()?,
                high: src.next_byte()?,
                ext: src.next_byte()?,
            },
            CMD_READ_FLASH => Command::ReadFlash,
            CMD_READ_DATA => Command::ReadData,
            CMD_READ_FUSE => Command::ReadFuse,
            CMD_READ_LOCK => Command::ReadLock,
            CMD_READ_PAGE => {
                let (len, memory) = page_header(src)?;
                if len > PAGE_CAPACITY {
                    Command::Oversized(len)
                } else {
                    Command::ReadPage { memory, len }
                }
            }
            CMD_READ_SIGN => Command::ReadSign,
            CMD_READ_OSCCAL => Command::ReadOscCal,
            CMD_READ_FUSE_EXT => Command::ReadFuseExt,
            other => {
                if let Some(n) = src.remaining() {
                    src.skip(n)?;
                }
                Command::Unknown(other)
            }
        };
        Ok(command)
    }

    /// Whether executing this command issues bus transactions
    pub fn needs_target(&self) -> bool {
        !matches!(
            self,
            Command::GetSync
                | Command::GetSignOn
                | Command::SetParameter { .. }
                | Command::GetParameter(_)
                | Command::SetDevice(_)
                | Command::SetDeviceExt(_)
                | Command::EnterProgmode
                | Command::LeaveProgmode
                | Command::LoadAddress(_)
                | Command::Oversized(_)
                | Command::Unknown(_)
        )
    }
}

/// Read the big-endian length and memory type of a page command
fn page_header<S: ByteSource + ?Sized>(src: &mut S) -> Result<(usize, Option<Memory>)> {
    let hi = src.next_byte()?;
    let lo = src.next_byte()?;
    let memory = Memory::from_byte(src.next_byte()?);
    Ok((u16::from_be_bytes([hi, lo]) as usize, memory))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> (Result<Command>, PageBuffer) {
        let mut buffer = PageBuffer::new();
        let mut src = SliceSource::new(&bytes[1..]);
        let cmd = Command::parse(bytes[0], &mut src, &mut buffer);
        (cmd, buffer)
    }

    #[test]
    fn test_parse_load_address_variants() {
        assert_eq!(parse(&[0x55, 0x34, 0x12]).0, Ok(Command::LoadAddress(0x1234)));
        assert_eq!(
            parse(&[0x55, 0x80, 0x01, 0x00, 0x40]).0,
            Ok(Command::LoadAddress(0x0001_0040))
        );
    }

    #[test]
    fn test_parse_prog_page_fills_buffer() {
        let (cmd, buffer) = parse(&[0x64, 0x00, 0x04, b'F', 1, 2, 3, 4]);
        assert_eq!(
            cmd,
            Ok(Command::ProgPage {
                memory: Some(Memory::Flash),
                len: 4
            })
        );
        assert_eq!(buffer.as_slice(), [1, 2, 3, 4]);
    }

    #[test]
    fn test_parse_oversized_page_leaves_buffer() {
        let mut bytes = [0u8; 4 + 300];
        bytes[..4].copy_from_slice(&[0x64, 0x01, 0x2C, b'E']);
        let mut buffer = PageBuffer::new();
        buffer.fill_from_slice(&[9, 9]).unwrap();
        let mut src = SliceSource::new(&bytes[1..]);
        let cmd = Command::parse(bytes[0], &mut src, &mut buffer);
        assert_eq!(cmd, Ok(Command::Oversized(300)));
        assert_eq!(buffer.as_slice(), [9, 9]);
        assert_eq!(src.remaining(), Some(0));
    }

    #[test]
    fn test_parse_set_device_ext() {
        let (cmd, _) = parse(&[0x45, 0x05, 0x04, 0xD7, 0xC2, 0x00]);
        assert_eq!(
            cmd,
            Ok(Command::SetDeviceExt(ExtendedParameters {
                eeprom_page_size: 4,
                pagel: 0xD7,
                bs2: 0xC2,
                reset_disable: 0,
            }))
        );
    }

    #[test]
    fn test_parse_truncated() {
        assert_eq!(parse(&[0x56, 0xAC, 0x53]).0, Err(Error::Truncated));
    }

    #[test]
    fn test_unknown_consumes_body() {
        let (cmd, _) = parse(&[0x99, 1, 2, 3]);
        assert_eq!(cmd, Ok(Command::Unknown(0x99)));
    }
}
