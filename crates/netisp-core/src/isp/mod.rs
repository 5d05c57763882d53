//! AVR serial programming instruction set
//!
//! Every instruction is four bytes clocked out back to back; the target
//! echoes the previous byte while shifting in, so the answer of interest
//! is usually the third (echo) or the fourth (data) returned byte.
//!
//! Flash addresses are word addresses. EEPROM addresses are byte addresses.

pub mod opcodes;

use crate::error::Result;
use crate::programmer::IspBus;

/// Fuse byte selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fuse {
    /// Low fuse byte
    Low,
    /// High fuse byte
    High,
    /// Extended fuse byte
    Extended,
}

/// Clock out one 4-byte instruction, returning all four received bytes
pub fn transaction<B: IspBus + ?Sized>(bus: &mut B, bytes: [u8; 4]) -> Result<[u8; 4]> {
    let mut out = [0u8; 4];
    for (o, b) in out.iter_mut().zip(bytes) {
        *o = bus.transfer(b)?;
    }
    log::trace!(
        "isp: {:02X} {:02X} {:02X} {:02X} -> {:02X} {:02X} {:02X} {:02X}",
        bytes[0],
        bytes[1],
        bytes[2],
        bytes[3],
        out[0],
        out[1],
        out[2],
        out[3]
    );
    Ok(out)
}

/// Clock out one instruction and return the last received byte
pub fn command<B: IspBus + ?Sized>(bus: &mut B, bytes: [u8; 4]) -> Result<u8> {
    Ok(transaction(bus, bytes)?[3])
}

/// Programming Enable; returns the echo byte (0x53 when in sync)
pub fn program_enable<B: IspBus + ?Sized>(bus: &mut B) -> Result<u8> {
    let resp = transaction(bus, [opcodes::PROG_PREFIX, opcodes::PROG_ENABLE, 0x00, 0x00])?;
    Ok(resp[2])
}

/// Chip Erase (flash and EEPROM unless EESAVE is programmed)
pub fn chip_erase<B: IspBus + ?Sized>(bus: &mut B) -> Result<()> {
    command(bus, [opcodes::PROG_PREFIX, opcodes::CHIP_ERASE, 0x00, 0x00])?;
    Ok(())
}

/// Load Extended Address byte for flash above 64 K words
pub fn load_extended_address<B: IspBus + ?Sized>(bus: &mut B, ext: u8) -> Result<()> {
    command(bus, [opcodes::LOAD_EXT_ADDR, 0x00, ext, 0x00])?;
    Ok(())
}

fn word_opcode(base: u8, high: bool) -> u8 {
    if high {
        base + opcodes::HIGH_BYTE
    } else {
        base
    }
}

/// Load one byte into the target's page buffer
pub fn load_page_byte<B: IspBus + ?Sized>(
    bus: &mut B,
    high: bool,
    word_addr: u16,
    value: u8,
) -> Result<()> {
    let [hi, lo] = word_addr.to_be_bytes();
    command(bus, [word_opcode(opcodes::LOAD_PAGE, high), hi, lo, value])?;
    Ok(())
}

/// Write the target's page buffer to the flash page containing `word_addr`
pub fn write_page<B: IspBus + ?Sized>(bus: &mut B, word_addr: u16) -> Result<()> {
    let [hi, lo] = word_addr.to_be_bytes();
    command(bus, [opcodes::WRITE_PAGE, hi, lo, 0x00])?;
    Ok(())
}

/// Read one byte of program memory
pub fn read_flash_byte<B: IspBus + ?Sized>(bus: &mut B, high: bool, word_addr: u16) -> Result<u8> {
    let [hi, lo] = word_addr.to_be_bytes();
    command(bus, [word_opcode(opcodes::READ_FLASH, high), hi, lo, 0x00])
}

/// Read one EEPROM byte
pub fn read_eeprom<B: IspBus + ?Sized>(bus: &mut B, addr: u16) -> Result<u8> {
    let [hi, lo] = addr.to_be_bytes();
    command(bus, [opcodes::READ_EEPROM, hi, lo, 0xFF])
}

/// Write one EEPROM byte
pub fn write_eeprom<B: IspBus + ?Sized>(bus: &mut B, addr: u16, value: u8) -> Result<()> {
    let [hi, lo] = addr.to_be_bytes();
    command(bus, [opcodes::WRITE_EEPROM, hi, lo, value])?;
    Ok(())
}

/// Read one of the three signature bytes
pub fn read_signature_byte<B: IspBus + ?Sized>(bus: &mut B, index: u8) -> Result<u8> {
    command(bus, [opcodes::READ_SIGNATURE, 0x00, index, 0x00])
}

/// Read all three signature bytes
pub fn read_signature<B: IspBus + ?Sized>(bus: &mut B) -> Result<[u8; 3]> {
    Ok([
        read_signature_byte(bus, 0)?,
        read_signature_byte(bus, 1)?,
        read_signature_byte(bus, 2)?,
    ])
}

/// Read the oscillator calibration byte
pub fn read_calibration<B: IspBus + ?Sized>(bus: &mut B) -> Result<u8> {
    command(bus, [opcodes::READ_CALIBRATION, 0x00, 0x00, 0x00])
}

/// Read a fuse byte
pub fn read_fuse<B: IspBus + ?Sized>(bus: &mut B, fuse: Fuse) -> Result<u8> {
    let (a, b) = match fuse {
        Fuse::Low => (opcodes::READ_FUSE, 0x00),
        Fuse::High => (opcodes::READ_LOCK, opcodes::READ_ALT),
        Fuse::Extended => (opcodes::READ_FUSE, opcodes::READ_ALT),
    };
    command(bus, [a, b, 0x00, 0x00])
}

/// Write a fuse byte
pub fn write_fuse<B: IspBus + ?Sized>(bus: &mut B, fuse: Fuse, value: u8) -> Result<()> {
    let op = match fuse {
        Fuse::Low => opcodes::WRITE_FUSE_LOW,
        Fuse::High => opcodes::WRITE_FUSE_HIGH,
        Fuse::Extended => opcodes::WRITE_FUSE_EXT,
    };
    command(bus, [opcodes::PROG_PREFIX, op, 0x00, value])?;
    Ok(())
}

/// Read the lock bits
pub fn read_lock<B: IspBus + ?Sized>(bus: &mut B) -> Result<u8> {
    command(bus, [opcodes::READ_LOCK, 0x00, 0x00, 0x00])
}

/// Write the lock bits
pub fn write_lock<B: IspBus + ?Sized>(bus: &mut B, value: u8) -> Result<()> {
    command(bus, [opcodes::PROG_PREFIX, opcodes::WRITE_LOCK, 0x00, value])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    /// Echoes every byte it receives one position late and records traffic
    struct EchoBus {
        sent: Vec<u8>,
        last: u8,
    }

    impl IspBus for EchoBus {
        fn transfer(&mut self, byte: u8) -> Result<u8> {
            self.sent.push(byte);
            let out = self.last;
            self.last = byte;
            Ok(out)
        }

        fn delay_us(&mut self, _us: u32) {}
    }

    #[test]
    fn test_program_enable_reads_echo() {
        let mut bus = EchoBus {
            sent: Vec::new(),
            last: 0,
        };
        assert_eq!(program_enable(&mut bus).unwrap(), 0x53);
        assert_eq!(bus.sent, [0xAC, 0x53, 0x00, 0x00]);
    }

    #[test]
    fn test_word_opcodes() {
        let mut bus = EchoBus {
            sent: Vec::new(),
            last: 0,
        };
        load_page_byte(&mut bus, false, 0x1234, 0xAA).unwrap();
        load_page_byte(&mut bus, true, 0x1234, 0xBB).unwrap();
        read_flash_byte(&mut bus, true, 0x0102).unwrap();
        assert_eq!(
            bus.sent,
            [0x40, 0x12, 0x34, 0xAA, 0x48, 0x12, 0x34, 0xBB, 0x28, 0x01, 0x02, 0x00]
        );
    }

    #[test]
    fn test_fuse_encodings() {
        let mut bus = EchoBus {
            sent: Vec::new(),
            last: 0,
        };
        read_fuse(&mut bus, Fuse::High).unwrap();
        read_fuse(&mut bus, Fuse::Extended).unwrap();
        write_fuse(&mut bus, Fuse::Extended, 0xFD).unwrap();
        assert_eq!(
            bus.sent,
            [0x58, 0x08, 0x00, 0x00, 0x50, 0x08, 0x00, 0x00, 0xAC, 0xA4, 0x00, 0xFD]
        );
    }
}
