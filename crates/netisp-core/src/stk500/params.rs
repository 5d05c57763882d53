//! Device and programmer parameter blocks
//!
//! `DeviceParameters` is sent once per session by the client (set device)
//! and describes the target's memories. `ProgrammerParameters` holds the
//! AVR061 settable parameter table.

use crate::error::{Error, Result};
use crate::memory::PAGE_CAPACITY;
use bitflags::bitflags;

use super::protocol::*;

/// Length of the set device payload
pub const SET_DEVICE_LEN: usize = 20;

/// Flash sizes above this need Load Extended Address
const EXTENDED_ADDRESS_THRESHOLD: u32 = 128 * 1024;

bitflags! {
    /// Programming capabilities announced for the target
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceCaps: u8 {
        /// Parallel/high-voltage programming supported
        const PARALLEL   = 1 << 0;
        /// Write completion may be detected by polling
        const POLLING    = 1 << 1;
        /// Programming is self-timed
        const SELF_TIMED = 1 << 2;
    }
}

/// Target programming parameters from the set device command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceParameters {
    /// AVR061 device code
    pub device_code: u8,
    /// Device revision
    pub revision: u8,
    /// Programming type (0 = both, 1 = serial only)
    pub prog_type: u8,
    /// Capability flags
    pub caps: DeviceCaps,
    /// Number of lock bytes
    pub lock_bytes: u8,
    /// Number of fuse bytes
    pub fuse_bytes: u8,
    /// Values that cannot be detected by flash polling
    pub flash_poll: [u8; 2],
    /// Values that cannot be detected by EEPROM polling
    pub eeprom_poll: [u8; 2],
    /// Flash page size in bytes (0 = not paged)
    pub page_size: u16,
    /// EEPROM size in bytes
    pub eeprom_size: u16,
    /// Flash size in bytes
    pub flash_size: u32,
}

impl DeviceParameters {
    /// Parse and validate the 20-byte set device payload
    ///
    /// Multi-byte fields are big-endian.
    pub fn parse(buf: &[u8; SET_DEVICE_LEN]) -> Result<Self> {
        let mut caps = DeviceCaps::empty();
        caps.set(DeviceCaps::PARALLEL, buf[3] != 0);
        caps.set(DeviceCaps::POLLING, buf[4] != 0);
        caps.set(DeviceCaps::SELF_TIMED, buf[5] != 0);

        let params = Self {
            device_code: buf[0],
            revision: buf[1],
            prog_type: buf[2],
            caps,
            lock_bytes: buf[6],
            fuse_bytes: buf[7],
            flash_poll: [buf[8], buf[9]],
            eeprom_poll: [buf[10], buf[11]],
            page_size: u16::from_be_bytes([buf[12], buf[13]]),
            eeprom_size: u16::from_be_bytes([buf[14], buf[15]]),
            flash_size: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
        };
        params.validate()?;
        Ok(params)
    }

    /// Check that the page size can be used for page address translation
    pub fn validate(&self) -> Result<()> {
        let size = self.page_size as usize;
        if size != 0 && (!size.is_power_of_two() || size > PAGE_CAPACITY) {
            return Err(Error::InvalidPageSize);
        }
        Ok(())
    }

    /// Whether write completion may be detected by polling
    pub fn polling(&self) -> bool {
        self.caps.contains(DeviceCaps::POLLING)
    }

    /// Whether `value` cannot be used to detect a finished flash write
    pub fn is_flash_poll_value(&self, value: u8) -> bool {
        self.flash_poll.contains(&value)
    }

    /// Whether `value` cannot be used to detect a finished EEPROM write
    pub fn is_eeprom_poll_value(&self, value: u8) -> bool {
        self.eeprom_poll.contains(&value)
    }

    /// Whether flash accesses need a Load Extended Address instruction
    pub fn needs_extended_address(&self) -> bool {
        self.flash_size > EXTENDED_ADDRESS_THRESHOLD
    }
}

/// Parameters from the set device ext command
///
/// Only stored for inspection; serial programming does not use them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtendedParameters {
    /// EEPROM page size in bytes
    pub eeprom_page_size: u8,
    /// Port pin used as PAGEL in parallel mode
    pub pagel: u8,
    /// Port pin used as BS2 in parallel mode
    pub bs2: u8,
    /// Reset pin disposition
    pub reset_disable: u8,
}

impl ExtendedParameters {
    /// Parse the parameter bytes following the count byte
    ///
    /// Older clients send fewer than four; missing values read as zero.
    pub fn parse(bytes: &[u8]) -> Self {
        let at = |i: usize| bytes.get(i).copied().unwrap_or(0);
        Self {
            eeprom_page_size: at(0),
            pagel: at(1),
            bs2: at(2),
            reset_disable: at(3),
        }
    }
}

/// Settable programmer parameters (AVR061 table)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgrammerParameters {
    /// LED state
    pub leds: u8,
    /// Target voltage in tenths of a volt
    pub vtarget: u8,
    /// Adjustable voltage in tenths of a volt
    pub vadjust: u8,
    /// Oscillator prescaler
    pub osc_pscale: u8,
    /// Oscillator compare match
    pub osc_cmatch: u8,
    /// Reset duration
    pub reset_duration: u8,
    /// ISP clock duration
    pub sck_duration: u8,
    /// Buffer size announced to the client
    pub bufsize: u16,
}

impl Default for ProgrammerParameters {
    fn default() -> Self {
        Self {
            leds: 0,
            vtarget: 50,
            vadjust: 50,
            osc_pscale: 0,
            osc_cmatch: 0,
            reset_duration: 0,
            sck_duration: 0,
            bufsize: PAGE_CAPACITY as u16,
        }
    }
}

impl ProgrammerParameters {
    /// Read a settable parameter, `None` for ids outside the table
    pub fn get(&self, id: u8) -> Option<u8> {
        let [buf_hi, buf_lo] = self.bufsize.to_be_bytes();
        match id {
            PARM_LEDS => Some(self.leds),
            PARM_VTARGET => Some(self.vtarget),
            PARM_VADJUST => Some(self.vadjust),
            PARM_OSC_PSCALE => Some(self.osc_pscale),
            PARM_OSC_CMATCH => Some(self.osc_cmatch),
            PARM_RESET_DURATION => Some(self.reset_duration),
            PARM_SCK_DURATION => Some(self.sck_duration),
            PARM_BUFSIZEL => Some(buf_lo),
            PARM_BUFSIZEH => Some(buf_hi),
            _ => None,
        }
    }

    /// Store a settable parameter; returns false for read-only or unknown ids
    pub fn set(&mut self, id: u8, value: u8) -> bool {
        match id {
            PARM_LEDS => self.leds = value,
            PARM_VTARGET => self.vtarget = value,
            PARM_VADJUST => self.vadjust = value,
            PARM_OSC_PSCALE => self.osc_pscale = value,
            PARM_OSC_CMATCH => self.osc_cmatch = value,
            PARM_RESET_DURATION => self.reset_duration = value,
            PARM_SCK_DURATION => self.sck_duration = value,
            PARM_BUFSIZEL => self.bufsize = (self.bufsize & 0xFF00) | value as u16,
            PARM_BUFSIZEH => self.bufsize = (self.bufsize & 0x00FF) | (value as u16) << 8,
            _ => return false,
        }
        true
    }
}
