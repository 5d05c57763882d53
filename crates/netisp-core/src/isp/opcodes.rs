//! AVR serial programming instruction bytes
//!
//! First (and for some instructions second) byte of each 4-byte
//! instruction from the AVR serial downloading tables.

// ============================================================================
// Programming control
// ============================================================================

/// Programming Enable / Chip Erase / fuse and lock writes prefix
pub const PROG_PREFIX: u8 = 0xAC;
/// Second byte of Programming Enable
pub const PROG_ENABLE: u8 = 0x53;
/// Second byte of Chip Erase
pub const CHIP_ERASE: u8 = 0x80;

// ============================================================================
// Flash
// ============================================================================

/// Load Extended Address byte (devices above 128 KiB)
pub const LOAD_EXT_ADDR: u8 = 0x4D;
/// Load Program Memory Page, low byte (add 0x08 for high byte)
pub const LOAD_PAGE: u8 = 0x40;
/// Write Program Memory Page
pub const WRITE_PAGE: u8 = 0x4C;
/// Read Program Memory, low byte (add 0x08 for high byte)
pub const READ_FLASH: u8 = 0x20;
/// Offset selecting the high byte of a flash word
pub const HIGH_BYTE: u8 = 0x08;

// ============================================================================
// EEPROM
// ============================================================================

/// Read EEPROM Memory
pub const READ_EEPROM: u8 = 0xA0;
/// Write EEPROM Memory
pub const WRITE_EEPROM: u8 = 0xC0;

// ============================================================================
// Signature, fuses, lock bits, calibration
// ============================================================================

/// Read Signature Byte
pub const READ_SIGNATURE: u8 = 0x30;
/// Read Calibration Byte
pub const READ_CALIBRATION: u8 = 0x38;
/// Read Fuse bits (low) / Extended Fuse bits with second byte 0x08
pub const READ_FUSE: u8 = 0x50;
/// Read Lock bits / Fuse High bits with second byte 0x08
pub const READ_LOCK: u8 = 0x58;
/// Second byte selecting the high/extended variant of a read
pub const READ_ALT: u8 = 0x08;

/// Write Lock bits (second byte after `PROG_PREFIX`)
pub const WRITE_LOCK: u8 = 0xE0;
/// Write Fuse bits (second byte after `PROG_PREFIX`)
pub const WRITE_FUSE_LOW: u8 = 0xA0;
/// Write Fuse High bits (second byte after `PROG_PREFIX`)
pub const WRITE_FUSE_HIGH: u8 = 0xA8;
/// Write Extended Fuse bits (second byte after `PROG_PREFIX`)
pub const WRITE_FUSE_EXT: u8 = 0xA4;
