//! STK500 (v1) protocol constants
//!
//! Command, response and parameter values follow Atmel application note
//! AVR061 so that avrdude's `arduino` and `stk500v1` programmers can talk
//! to the bridge unchanged.

// ============================================================================
// Framing
// ============================================================================

/// End of every request (`Sync_CRC_EOP`)
pub const CRC_EOP: u8 = 0x20;
/// First byte of a sequenced request envelope
pub const MESSAGE_START: u8 = 0x1B;

// ============================================================================
// Responses
// ============================================================================

/// Command completed
pub const RESP_OK: u8 = 0x10;
/// Command failed
pub const RESP_FAILED: u8 = 0x11;
/// Unknown command
pub const RESP_UNKNOWN: u8 = 0x12;
/// Target did not respond
pub const RESP_NODEVICE: u8 = 0x13;
/// Request was in sync
pub const RESP_INSYNC: u8 = 0x14;
/// Request was out of sync
pub const RESP_NOSYNC: u8 = 0x15;

// ============================================================================
// Commands
// ============================================================================

/// Synchronize
pub const CMD_GET_SYNC: u8 = 0x30;
/// Identify programmer
pub const CMD_GET_SIGN_ON: u8 = 0x31;
/// Set programmer parameter
pub const CMD_SET_PARAMETER: u8 = 0x40;
/// Get programmer parameter
pub const CMD_GET_PARAMETER: u8 = 0x41;
/// Set device programming parameters
pub const CMD_SET_DEVICE: u8 = 0x42;
/// Set extended device programming parameters
pub const CMD_SET_DEVICE_EXT: u8 = 0x45;
/// Enter programming mode
pub const CMD_ENTER_PROGMODE: u8 = 0x50;
/// Leave programming mode
pub const CMD_LEAVE_PROGMODE: u8 = 0x51;
/// Erase flash and EEPROM
pub const CMD_CHIP_ERASE: u8 = 0x52;
/// Load memory cursor
pub const CMD_LOAD_ADDRESS: u8 = 0x55;
/// Raw 4-byte bus instruction
pub const CMD_UNIVERSAL: u8 = 0x56;
/// Program one flash word
pub const CMD_PROG_FLASH: u8 = 0x60;
/// Program one EEPROM byte
pub const CMD_PROG_DATA: u8 = 0x61;
/// Program low and high fuse
pub const CMD_PROG_FUSE: u8 = 0x62;
/// Program lock bits
pub const CMD_PROG_LOCK: u8 = 0x63;
/// Program a block of flash or EEPROM
pub const CMD_PROG_PAGE: u8 = 0x64;
/// Program low, high and extended fuse
pub const CMD_PROG_FUSE_EXT: u8 = 0x65;
/// Read one flash word
pub const CMD_READ_FLASH: u8 = 0x70;
/// Read one EEPROM byte
pub const CMD_READ_DATA: u8 = 0x71;
/// Read low and high fuse
pub const CMD_READ_FUSE: u8 = 0x72;
/// Read lock bits
pub const CMD_READ_LOCK: u8 = 0x73;
/// Read a block of flash or EEPROM
pub const CMD_READ_PAGE: u8 = 0x74;
/// Read the three signature bytes
pub const CMD_READ_SIGN: u8 = 0x75;
/// Read the oscillator calibration byte
pub const CMD_READ_OSCCAL: u8 = 0x76;
/// Read low, high and extended fuse
pub const CMD_READ_FUSE_EXT: u8 = 0x77;

// ============================================================================
// Parameters
// ============================================================================

/// Hardware version
pub const PARM_HW_VER: u8 = 0x80;
/// Firmware major version
pub const PARM_SW_MAJOR: u8 = 0x81;
/// Firmware minor version
pub const PARM_SW_MINOR: u8 = 0x82;
/// LED state
pub const PARM_LEDS: u8 = 0x83;
/// Target supply voltage
pub const PARM_VTARGET: u8 = 0x84;
/// Adjustable voltage
pub const PARM_VADJUST: u8 = 0x85;
/// Oscillator prescaler
pub const PARM_OSC_PSCALE: u8 = 0x86;
/// Oscillator compare match
pub const PARM_OSC_CMATCH: u8 = 0x87;
/// Reset pulse duration
pub const PARM_RESET_DURATION: u8 = 0x88;
/// ISP clock duration
pub const PARM_SCK_DURATION: u8 = 0x89;
/// Buffer size, low byte
pub const PARM_BUFSIZEL: u8 = 0x90;
/// Buffer size, high byte
pub const PARM_BUFSIZEH: u8 = 0x91;
/// Device code from the last set device
pub const PARM_DEVICE: u8 = 0x92;
/// Programming mode ('S' for serial)
pub const PARM_PROGMODE: u8 = 0x93;
/// Parallel mode support
pub const PARM_PARAMODE: u8 = 0x94;
/// Polling support
pub const PARM_POLLING: u8 = 0x95;
/// Self-timed programming support
pub const PARM_SELFTIMED: u8 = 0x96;
/// Top card detection
pub const PARM_TOPCARD_DETECT: u8 = 0x98;
/// Session error counter (vendor extension)
pub const PARM_ERROR_COUNT: u8 = 0xA0;

// ============================================================================
// Identification
// ============================================================================

/// Reported hardware version
pub const HW_VERSION: u8 = 2;
/// Reported firmware major version
pub const SW_MAJOR: u8 = 1;
/// Reported firmware minor version
pub const SW_MINOR: u8 = 18;
/// Sign-on string
pub const SIGN_ON: &[u8] = b"AVR ISP";
/// Serial programming mode marker
pub const PROGMODE_SERIAL: u8 = b'S';

/// Memory type byte for flash in page commands
pub const MEMTYPE_FLASH: u8 = b'F';
/// Memory type byte for EEPROM in page commands
pub const MEMTYPE_EEPROM: u8 = b'E';
