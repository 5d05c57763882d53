//! In-memory AVR target
//!
//! `DummyAvr` decodes the 4-byte serial programming instructions exactly as
//! they arrive on the bus: byte 2 and 3 echo the previous input byte, byte 4
//! carries read data. The target only listens while its reset line is
//! asserted, and every new reset pulse re-synchronizes the instruction
//! framing and leaves programming mode.
//!
//! Write completion is modeled with a virtual clock advanced by
//! [`IspBus::delay_us`]: memory reads return 0xFF until the busy time of the
//! last write has elapsed, so write polling behaves as on silicon.

use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use netisp_core::error::{Error, Result};
use netisp_core::isp::opcodes;
use netisp_core::programmer::{IspBus, ResetLine};

/// Poll RDY/BSY instruction (not used by the programmer, answered anyway)
const POLL_READY: u8 = 0xF0;

/// EESAVE bit in the high fuse (programmed = 0 keeps EEPROM on erase)
const EESAVE: u8 = 1 << 3;

/// Configuration for the emulated target
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Signature bytes
    pub signature: [u8; 3],
    /// Flash size in bytes
    pub flash_size: usize,
    /// Flash page size in bytes
    pub page_size: usize,
    /// EEPROM size in bytes
    pub eeprom_size: usize,
    /// Oscillator calibration byte
    pub calibration: u8,
    /// Initial low, high and extended fuse
    pub fuses: [u8; 3],
    /// Initial lock bits
    pub lock: u8,
    /// Busy time after a flash page write
    pub flash_busy_us: u32,
    /// Busy time after an EEPROM byte write
    pub eeprom_busy_us: u32,
    /// Busy time after chip erase
    pub erase_busy_us: u32,
    /// Programming Enable attempts answered out of sync before one succeeds
    pub enable_failures: u32,
}

impl Default for DummyConfig {
    fn default() -> Self {
        // ATmega328P
        Self {
            signature: [0x1E, 0x95, 0x0F],
            flash_size: 32 * 1024,
            page_size: 128,
            eeprom_size: 1024,
            calibration: 0x9C,
            fuses: [0x62, 0xD9, 0xFF],
            lock: 0xFF,
            flash_busy_us: 4_500,
            eeprom_busy_us: 3_600,
            erase_busy_us: 9_000,
            enable_failures: 0,
        }
    }
}

impl DummyConfig {
    /// ATmega2560, the common part with more than 64 K words of flash
    pub fn atmega2560() -> Self {
        Self {
            signature: [0x1E, 0x98, 0x01],
            flash_size: 256 * 1024,
            page_size: 256,
            eeprom_size: 4096,
            fuses: [0x62, 0x99, 0xFF],
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct ResetPin {
    active: Cell<bool>,
    asserts: Cell<u32>,
    levels: RefCell<Vec<bool>>,
}

/// Reset line wired to a [`DummyAvr`]
///
/// Records every level it is driven to.
#[derive(Debug, Clone)]
pub struct DummyReset {
    pin: Rc<ResetPin>,
}

impl DummyReset {
    /// Whether reset is currently asserted
    pub fn is_active(&self) -> bool {
        self.pin.active.get()
    }

    /// Every level driven so far, oldest first
    pub fn levels(&self) -> Vec<bool> {
        self.pin.levels.borrow().clone()
    }
}

impl ResetLine for DummyReset {
    fn set_level(&mut self, active: bool) -> Result<()> {
        if active && !self.pin.active.get() {
            self.pin.asserts.set(self.pin.asserts.get() + 1);
        }
        self.pin.active.set(active);
        self.pin.levels.borrow_mut().push(active);
        Ok(())
    }
}

/// Emulated AVR target
pub struct DummyAvr {
    config: DummyConfig,
    flash: Vec<u8>,
    eeprom: Vec<u8>,
    page: Vec<u8>,
    fuses: [u8; 3],
    lock: u8,
    ext_addr: u8,
    pin: Rc<ResetPin>,
    seen_asserts: u32,
    enabled: bool,
    failures_left: u32,
    frame: [u8; 4],
    pos: usize,
    now_us: u64,
    busy_until: u64,
    claimed: bool,
    log: Vec<[u8; 4]>,
}

impl DummyAvr {
    /// Create an erased target with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            flash: vec![0xFF; config.flash_size],
            eeprom: vec![0xFF; config.eeprom_size],
            page: vec![0xFF; config.page_size.max(2)],
            fuses: config.fuses,
            lock: config.lock,
            ext_addr: 0,
            pin: Rc::new(ResetPin::default()),
            seen_asserts: 0,
            enabled: false,
            failures_left: config.enable_failures,
            frame: [0; 4],
            pos: 0,
            now_us: 0,
            busy_until: 0,
            claimed: false,
            log: Vec::new(),
            config,
        }
    }

    /// Create an ATmega328P
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Reset line connected to this target
    pub fn reset_line(&self) -> DummyReset {
        DummyReset {
            pin: Rc::clone(&self.pin),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Get a reference to the flash contents
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Get a mutable reference to the flash contents
    pub fn flash_mut(&mut self) -> &mut [u8] {
        &mut self.flash
    }

    /// Get a reference to the EEPROM contents
    pub fn eeprom(&self) -> &[u8] {
        &self.eeprom
    }

    /// Get a mutable reference to the EEPROM contents
    pub fn eeprom_mut(&mut self) -> &mut [u8] {
        &mut self.eeprom
    }

    /// Low, high and extended fuse
    pub fn fuses(&self) -> [u8; 3] {
        self.fuses
    }

    /// Lock bits
    pub fn lock(&self) -> u8 {
        self.lock
    }

    /// Whether Programming Enable has been accepted since the last reset
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the programmer currently drives the bus
    pub fn is_claimed(&self) -> bool {
        self.claimed
    }

    /// Virtual time spent in delays
    pub fn elapsed_us(&self) -> u64 {
        self.now_us
    }

    /// Every complete instruction seen while reset was asserted
    pub fn instructions(&self) -> &[[u8; 4]] {
        &self.log
    }

    /// Forget the instruction log
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Pick up reset pulses; returns whether the target is listening
    fn sync_reset(&mut self) -> bool {
        let asserts = self.pin.asserts.get();
        if asserts != self.seen_asserts {
            self.seen_asserts = asserts;
            self.pos = 0;
            self.enabled = false;
            self.ext_addr = 0;
        }
        self.pin.active.get()
    }

    fn busy(&self) -> bool {
        self.now_us < self.busy_until
    }

    fn start_busy(&mut self, us: u32) {
        self.busy_until = self.now_us + u64::from(us);
    }

    fn words_per_page(&self) -> usize {
        (self.config.page_size / 2).max(1)
    }

    /// Word address of the instruction in the frame buffer
    fn word(&self) -> usize {
        (self.ext_addr as usize) << 16 | (self.frame[1] as usize) << 8 | self.frame[2] as usize
    }

    /// Output shifted out while the current byte shifts in
    fn output(&self) -> u8 {
        let [op, a, b, _] = self.frame;
        match self.pos {
            0 => 0x00,
            1 => op,
            2 if op == opcodes::PROG_PREFIX && a == opcodes::PROG_ENABLE => {
                if self.failures_left > 0 {
                    0x00
                } else {
                    a
                }
            }
            2 => a,
            _ if !self.enabled => 0x00,
            _ => self.read(op, a, b),
        }
    }

    fn read(&self, op: u8, a: u8, b: u8) -> u8 {
        let busy_or = |value: Option<&u8>| {
            if self.busy() {
                0xFF
            } else {
                value.copied().unwrap_or(0xFF)
            }
        };
        match op {
            op if op & !opcodes::HIGH_BYTE == opcodes::READ_FLASH => {
                let high = (op & opcodes::HIGH_BYTE != 0) as usize;
                busy_or(self.flash.get(self.word() * 2 + high))
            }
            opcodes::READ_EEPROM => busy_or(self.eeprom.get(usize::from(u16::from_be_bytes([a, b])))),
            opcodes::READ_SIGNATURE => self.config.signature.get(b as usize).copied().unwrap_or(0xFF),
            opcodes::READ_CALIBRATION => self.config.calibration,
            opcodes::READ_FUSE if a == opcodes::READ_ALT => self.fuses[2],
            opcodes::READ_FUSE => self.fuses[0],
            opcodes::READ_LOCK if a == opcodes::READ_ALT => self.fuses[1],
            opcodes::READ_LOCK => self.lock,
            POLL_READY => self.busy() as u8,
            _ => 0x00,
        }
    }

    /// Apply a complete instruction
    fn execute(&mut self) {
        let [op, a, b, value] = self.frame;
        if !self.enabled {
            if op == opcodes::PROG_PREFIX && a == opcodes::PROG_ENABLE {
                if self.failures_left > 0 {
                    self.failures_left -= 1;
                    log::debug!("dummy: ignoring Programming Enable");
                } else {
                    self.enabled = true;
                    log::debug!("dummy: programming enabled");
                }
            }
            return;
        }
        match op {
            opcodes::PROG_PREFIX => match a {
                opcodes::PROG_ENABLE => {}
                opcodes::CHIP_ERASE => self.chip_erase(),
                opcodes::WRITE_FUSE_LOW => self.fuses[0] = value,
                opcodes::WRITE_FUSE_HIGH => self.fuses[1] = value,
                opcodes::WRITE_FUSE_EXT => self.fuses[2] = value,
                opcodes::WRITE_LOCK => self.lock &= value,
                other => log::debug!("dummy: unknown write 0xAC 0x{:02X}", other),
            },
            opcodes::LOAD_EXT_ADDR => self.ext_addr = b,
            op if op & !opcodes::HIGH_BYTE == opcodes::LOAD_PAGE => {
                let high = (op & opcodes::HIGH_BYTE != 0) as usize;
                let slot = (self.word() % self.words_per_page()) * 2 + high;
                if let Some(cell) = self.page.get_mut(slot) {
                    *cell = value;
                }
            }
            opcodes::WRITE_PAGE => self.commit_page(),
            opcodes::WRITE_EEPROM => {
                let addr = usize::from(u16::from_be_bytes([a, b]));
                if let Some(cell) = self.eeprom.get_mut(addr) {
                    *cell = value;
                }
                self.start_busy(self.config.eeprom_busy_us);
            }
            _ => {}
        }
    }

    fn commit_page(&mut self) {
        let base = (self.word() & !(self.words_per_page() - 1)) * 2;
        for (i, &byte) in self.page.iter().enumerate() {
            // Programming can only clear bits
            if let Some(cell) = self.flash.get_mut(base + i) {
                *cell &= byte;
            }
        }
        self.page.fill(0xFF);
        self.start_busy(self.config.flash_busy_us);
        log::trace!("dummy: wrote page at 0x{:05X}", base);
    }

    fn chip_erase(&mut self) {
        self.flash.fill(0xFF);
        if self.fuses[1] & EESAVE != 0 {
            self.eeprom.fill(0xFF);
        }
        self.lock = 0xFF;
        self.start_busy(self.config.erase_busy_us);
        log::debug!("dummy: chip erased");
    }
}

impl IspBus for DummyAvr {
    fn transfer(&mut self, byte: u8) -> Result<u8> {
        if !self.claimed {
            log::error!("dummy: transfer on an unclaimed bus");
            return Err(Error::BusTransferFailed);
        }
        if !self.sync_reset() {
            // Target is running, MISO floats high
            return Ok(0xFF);
        }
        let out = self.output();
        self.frame[self.pos] = byte;
        if self.pos == 3 {
            self.execute();
            self.log.push(self.frame);
            self.pos = 0;
        } else {
            self.pos += 1;
        }
        Ok(out)
    }

    fn delay_us(&mut self, us: u32) {
        self.now_us += u64::from(us);
    }

    fn claim(&mut self) -> Result<()> {
        self.claimed = true;
        Ok(())
    }

    fn release(&mut self) {
        self.claimed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netisp_core::isp;

    fn enabled() -> DummyAvr {
        let mut avr = DummyAvr::new_default();
        let mut reset = avr.reset_line();
        avr.claim().unwrap();
        reset.set_level(true).unwrap();
        assert_eq!(isp::program_enable(&mut avr).unwrap(), opcodes::PROG_ENABLE);
        avr
    }

    #[test]
    fn test_ignores_bus_while_running() {
        let mut avr = DummyAvr::new_default();
        avr.claim().unwrap();
        assert_eq!(isp::program_enable(&mut avr).unwrap(), 0xFF);
        assert!(!avr.is_enabled());
        assert!(avr.instructions().is_empty());
    }

    #[test]
    fn test_unclaimed_bus_fails() {
        let mut avr = DummyAvr::new_default();
        assert_eq!(avr.transfer(0xAC), Err(Error::BusTransferFailed));
    }

    #[test]
    fn test_signature_and_fuses() {
        let mut avr = enabled();
        assert_eq!(isp::read_signature(&mut avr).unwrap(), [0x1E, 0x95, 0x0F]);
        isp::write_fuse(&mut avr, isp::Fuse::High, 0xDE).unwrap();
        assert_eq!(isp::read_fuse(&mut avr, isp::Fuse::High).unwrap(), 0xDE);
        assert_eq!(isp::read_fuse(&mut avr, isp::Fuse::Extended).unwrap(), 0xFF);
        assert_eq!(isp::read_calibration(&mut avr).unwrap(), 0x9C);
    }

    #[test]
    fn test_page_write_is_busy_then_readable() {
        let mut avr = enabled();
        isp::load_page_byte(&mut avr, false, 0x41, 0x12).unwrap();
        isp::load_page_byte(&mut avr, true, 0x41, 0x34).unwrap();
        isp::write_page(&mut avr, 0x41).unwrap();
        assert_eq!(isp::read_flash_byte(&mut avr, false, 0x41).unwrap(), 0xFF);

        avr.delay_us(4_500);
        assert_eq!(isp::read_flash_byte(&mut avr, false, 0x41).unwrap(), 0x12);
        assert_eq!(isp::read_flash_byte(&mut avr, true, 0x41).unwrap(), 0x34);
        assert_eq!(&avr.flash()[0x82..0x84], &[0x12, 0x34]);
    }

    #[test]
    fn test_flash_bits_only_clear() {
        let mut avr = enabled();
        avr.flash_mut()[0] = 0x0F;
        isp::load_page_byte(&mut avr, false, 0, 0xF3).unwrap();
        isp::write_page(&mut avr, 0).unwrap();
        assert_eq!(avr.flash()[0], 0x03);
    }

    #[test]
    fn test_chip_erase_honors_eesave() {
        let mut avr = enabled();
        avr.eeprom_mut()[3] = 0x42;
        isp::write_fuse(&mut avr, isp::Fuse::High, 0xD1).unwrap();
        isp::chip_erase(&mut avr).unwrap();
        assert_eq!(avr.eeprom()[3], 0x42);
    }

    #[test]
    fn test_enable_failures_until_reset() {
        let mut avr = DummyAvr::new(DummyConfig {
            enable_failures: 1,
            ..DummyConfig::default()
        });
        let mut reset = avr.reset_line();
        avr.claim().unwrap();
        reset.set_level(true).unwrap();
        assert_eq!(isp::program_enable(&mut avr).unwrap(), 0x00);
        reset.set_level(false).unwrap();
        reset.set_level(true).unwrap();
        assert_eq!(isp::program_enable(&mut avr).unwrap(), opcodes::PROG_ENABLE);
        assert!(avr.is_enabled());
        assert_eq!(reset.levels(), [true, false, true]);
    }
}
