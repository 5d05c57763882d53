//! Memory programming algorithms
//!
//! Flash is written by loading the target's page buffer one word at a time
//! (low byte, then high byte) and committing each page with Write Program
//! Memory Page. EEPROM is written byte by byte. Completion of a write is
//! either waited out with a flat delay or detected by reading a freshly
//! written location back until it returns the written value.
//!
//! Flash addresses handed to this module are word addresses, EEPROM
//! addresses are byte addresses.

use crate::error::{Error, Result};
use crate::isp;
use crate::programmer::IspBus;
use crate::stk500::DeviceParameters;

/// Page buffer capacity in bytes (largest supported flash page)
pub const PAGE_CAPACITY: usize = 256;

/// Staging buffer for page writes and reads
#[derive(Debug, Clone)]
pub struct PageBuffer {
    data: [u8; PAGE_CAPACITY],
    len: usize,
}

impl Default for PageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageBuffer {
    /// Create an empty buffer
    pub const fn new() -> Self {
        Self {
            data: [0; PAGE_CAPACITY],
            len: 0,
        }
    }

    /// Fill the buffer with exactly `len` bytes produced by `next`
    ///
    /// Returns [`Error::Oversized`] without calling `next` or modifying the
    /// buffer when `len` exceeds the capacity.
    pub fn fill_with<F>(&mut self, len: usize, mut next: F) -> Result<()>
    where
        F: FnMut() -> Result<u8>,
    {
        if len > PAGE_CAPACITY {
            return Err(Error::Oversized);
        }
        for slot in &mut self.data[..len] {
            *slot = next()?;
        }
        self.len = len;
        Ok(())
    }

    /// Fill the buffer from a slice
    #[cfg(test)]
    pub fn fill_from_slice(&mut self, bytes: &[u8]) -> Result<()> {
        let mut it = bytes.iter().copied();
        self.fill_with(bytes.len(), || it.next().ok_or(Error::Truncated))
    }

    /// Resize to `len` bytes and return them for in-place writing
    pub fn stage(&mut self, len: usize) -> Result<&mut [u8]> {
        if len > PAGE_CAPACITY {
            return Err(Error::Oversized);
        }
        self.len = len;
        Ok(&mut self.data[..len])
    }

    /// Contents of the most recent fill
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Forget the contents
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// Page-align a flash word address
///
/// `page_size` is in bytes and must be zero or a power of two; zero (and
/// one-word pages) leave the address unchanged.
pub fn addr_page(word_addr: u32, page_size: u16) -> u32 {
    let words = u32::from(page_size / 2);
    if words <= 1 {
        return word_addr;
    }
    word_addr & !(words - 1)
}

/// Word addresses reachable without Load Extended Address
const WORD_WINDOW: u64 = 0x1_0000;

/// Check that `words` flash words starting at `start` exist on the target
fn check_flash_range(device: Option<&DeviceParameters>, start: u32, words: usize) -> Result<()> {
    let limit = match device {
        Some(d) if d.flash_size > 0 => u64::from(d.flash_size / 2),
        _ => WORD_WINDOW,
    };
    if u64::from(start) + words as u64 > limit {
        return Err(Error::AddressOutOfBounds);
    }
    Ok(())
}

/// Check that `len` EEPROM bytes starting at `start` exist on the target
fn check_eeprom_range(device: Option<&DeviceParameters>, start: u32, len: usize) -> Result<()> {
    let limit = match device {
        Some(d) => u64::from(d.eeprom_size),
        None => WORD_WINDOW,
    };
    if u64::from(start) + len as u64 > limit {
        return Err(Error::AddressOutOfBounds);
    }
    Ok(())
}

/// Programming delays and polling bounds, all in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Flat wait after committing a flash page
    pub flash_write_delay_us: u32,
    /// Flat wait after writing an EEPROM byte
    pub eeprom_write_delay_us: u32,
    /// Wait after chip erase
    pub chip_erase_delay_us: u32,
    /// Maximum read-backs when polling a write
    pub poll_attempts: u32,
    /// Wait before each poll read-back
    pub poll_interval_us: u32,
    /// Reset pulse width when entering programming mode
    pub reset_pulse_us: u32,
    /// Wait after asserting reset before Programming Enable
    pub reset_settle_us: u32,
    /// Maximum Programming Enable attempts
    pub enable_attempts: u32,
    /// Wait after a resync reset pulse between enable attempts
    pub enable_retry_settle_us: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            flash_write_delay_us: 10_000,
            eeprom_write_delay_us: 45_000,
            chip_erase_delay_us: 45_000,
            poll_attempts: 100,
            poll_interval_us: 100,
            reset_pulse_us: 50,
            reset_settle_us: 30_000,
            enable_attempts: 32,
            enable_retry_settle_us: 20_000,
        }
    }
}

/// Outcome of a page write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteReport {
    /// Writes whose completion was detected by polling
    pub polled: u32,
    /// Polls that never matched and fell back to the flat delay
    pub timeouts: u32,
}

impl WriteReport {
    /// Whether any poll gave up
    pub fn timed_out(&self) -> bool {
        self.timeouts > 0
    }
}

/// A byte loaded into the target's flash page buffer
#[derive(Debug, Clone, Copy)]
struct Loaded {
    word: u32,
    high: bool,
    value: u8,
}

/// Tracks the poll location of the page being loaded
///
/// The final byte loaded into a page is never polled; the location used
/// is the latest earlier byte whose value is distinguishable from an
/// unfinished write.
#[derive(Debug, Default)]
struct PagePoll {
    last: Option<Loaded>,
    candidate: Option<Loaded>,
}

impl PagePoll {
    fn load(&mut self, device: &DeviceParameters, byte: Loaded) {
        if let Some(prev) = self.last {
            if !device.is_flash_poll_value(prev.value) {
                self.candidate = Some(prev);
            }
        }
        self.last = Some(byte);
    }

    fn take(&mut self) -> Option<Loaded> {
        self.last = None;
        self.candidate.take()
    }
}

/// Target memory access over an ISP bus
pub struct IspTarget<B> {
    bus: B,
    timing: Timing,
    segment: Option<u8>,
}

impl<B: IspBus> IspTarget<B> {
    /// Create a target accessor
    pub fn new(bus: B, timing: Timing) -> Self {
        Self {
            bus,
            timing,
            segment: None,
        }
    }

    /// Get a reference to the bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Get a mutable reference to the bus
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Configured timing
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Forget the last Load Extended Address byte
    ///
    /// Must be called whenever the target has been reset.
    pub fn reset_segment(&mut self) {
        self.segment = None;
    }

    /// Delay on the bus clock
    pub fn delay_us(&mut self, us: u32) {
        self.bus.delay_us(us);
    }

    fn select_segment(&mut self, device: Option<&DeviceParameters>, word: u32) -> Result<()> {
        if !device.is_some_and(DeviceParameters::needs_extended_address) {
            return Ok(());
        }
        let ext = (word >> 16) as u8;
        if self.segment != Some(ext) {
            isp::load_extended_address(&mut self.bus, ext)?;
            self.segment = Some(ext);
        }
        Ok(())
    }

    /// Write `data` to flash starting at word address `start`
    ///
    /// Pages are committed whenever the page address changes and after the
    /// last word. An odd trailing byte is paired with 0xFF.
    pub fn write_flash(
        &mut self,
        device: &DeviceParameters,
        start: u32,
        data: &[u8],
    ) -> Result<WriteReport> {
        check_flash_range(Some(device), start, data.len().div_ceil(2))?;
        let mut report = WriteReport::default();
        let mut poll = PagePoll::default();
        let mut page = addr_page(start, device.page_size);

        for (i, pair) in data.chunks(2).enumerate() {
            let here = start + i as u32;
            if addr_page(here, device.page_size) != page {
                self.commit_flash(device, page, &mut poll, &mut report)?;
                page = addr_page(here, device.page_size);
            }
            self.select_segment(Some(device), here)?;
            let low = pair[0];
            let high = pair.get(1).copied().unwrap_or(0xFF);
            isp::load_page_byte(&mut self.bus, false, here as u16, low)?;
            poll.load(
                device,
                Loaded {
                    word: here,
                    high: false,
                    value: low,
                },
            );
            isp::load_page_byte(&mut self.bus, true, here as u16, high)?;
            poll.load(
                device,
                Loaded {
                    word: here,
                    high: true,
                    value: high,
                },
            );
        }
        if !data.is_empty() {
            self.commit_flash(device, page, &mut poll, &mut report)?;
        }
        Ok(report)
    }

    fn commit_flash(
        &mut self,
        device: &DeviceParameters,
        page: u32,
        poll: &mut PagePoll,
        report: &mut WriteReport,
    ) -> Result<()> {
        self.select_segment(Some(device), page)?;
        isp::write_page(&mut self.bus, page as u16)?;
        if let Some(loc) = poll.take().filter(|_| device.polling()) {
            let matched = self.poll_until(loc.value, |bus| {
                isp::read_flash_byte(bus, loc.high, loc.word as u16)
            })?;
            if matched {
                report.polled += 1;
            } else {
                log::debug!("isp: flash poll at word 0x{:05X} timed out", loc.word);
                report.timeouts += 1;
            }
        }
        // The final byte of the page cannot be polled, so it is always waited out
        self.bus.delay_us(self.timing.flash_write_delay_us);
        log::trace!("isp: committed flash page 0x{:05X}", page);
        Ok(())
    }

    /// Write `data` to EEPROM starting at byte address `start`
    pub fn write_eeprom(
        &mut self,
        device: &DeviceParameters,
        start: u32,
        data: &[u8],
    ) -> Result<WriteReport> {
        check_eeprom_range(Some(device), start, data.len())?;
        let mut report = WriteReport::default();
        for (i, &value) in data.iter().enumerate() {
            let addr = (start as usize + i) as u16;
            isp::write_eeprom(&mut self.bus, addr, value)?;
            if device.polling() && !device.is_eeprom_poll_value(value) {
                let matched = self.poll_until(value, |bus| isp::read_eeprom(bus, addr))?;
                self.account(matched, self.timing.eeprom_write_delay_us, &mut report);
            } else {
                self.bus.delay_us(self.timing.eeprom_write_delay_us);
            }
        }
        Ok(report)
    }

    /// Read back until `read` returns `expected`, at most `poll_attempts` times
    fn poll_until<F>(&mut self, expected: u8, mut read: F) -> Result<bool>
    where
        F: FnMut(&mut B) -> Result<u8>,
    {
        for _ in 0..self.timing.poll_attempts {
            self.bus.delay_us(self.timing.poll_interval_us);
            if read(&mut self.bus)? == expected {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn account(&mut self, matched: bool, fallback_us: u32, report: &mut WriteReport) {
        if matched {
            report.polled += 1;
        } else {
            log::debug!("isp: write poll timed out, waiting {} us", fallback_us);
            self.bus.delay_us(fallback_us);
            report.timeouts += 1;
        }
    }

    /// Read flash starting at word address `start` into `out`
    ///
    /// Reads low byte then high byte of each word; an odd length stops
    /// after the last low byte.
    pub fn read_flash(
        &mut self,
        device: Option<&DeviceParameters>,
        start: u32,
        out: &mut [u8],
    ) -> Result<()> {
        check_flash_range(device, start, out.len().div_ceil(2))?;
        for (i, pair) in out.chunks_mut(2).enumerate() {
            let here = start + i as u32;
            self.select_segment(device, here)?;
            pair[0] = isp::read_flash_byte(&mut self.bus, false, here as u16)?;
            if let Some(high) = pair.get_mut(1) {
                *high = isp::read_flash_byte(&mut self.bus, true, here as u16)?;
            }
        }
        Ok(())
    }

    /// Read EEPROM starting at byte address `start` into `out`
    ///
    /// Without device parameters only the 16-bit address range is checked.
    pub fn read_eeprom(
        &mut self,
        device: Option<&DeviceParameters>,
        start: u32,
        out: &mut [u8],
    ) -> Result<()> {
        check_eeprom_range(device, start, out.len())?;
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = isp::read_eeprom(&mut self.bus, (start as usize + i) as u16)?;
        }
        Ok(())
    }

    /// Chip erase followed by the erase delay
    pub fn chip_erase(&mut self) -> Result<()> {
        isp::chip_erase(&mut self.bus)?;
        self.bus.delay_us(self.timing.chip_erase_delay_us);
        self.segment = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stk500::params::{DeviceCaps, DeviceParameters};
    use std::vec::Vec;

    /// Groups transfers into instructions; reads answer `read_value`
    #[derive(Default)]
    struct ScriptBus {
        pending: Vec<u8>,
        instructions: Vec<[u8; 4]>,
        delays: Vec<u32>,
        read_value: u8,
    }

    impl IspBus for ScriptBus {
        fn transfer(&mut self, byte: u8) -> Result<u8> {
            self.pending.push(byte);
            if self.pending.len() == 4 {
                let i = [self.pending[0], self.pending[1], self.pending[2], self.pending[3]];
                self.pending.clear();
                self.instructions.push(i);
                return Ok(self.read_value);
            }
            Ok(0)
        }

        fn delay_us(&mut self, us: u32) {
            self.delays.push(us);
        }
    }

    fn device(page_size: u16, polling: bool) -> DeviceParameters {
        DeviceParameters {
            device_code: 0x86,
            revision: 0,
            prog_type: 0,
            caps: if polling {
                DeviceCaps::POLLING
            } else {
                DeviceCaps::empty()
            },
            lock_bytes: 1,
            fuse_bytes: 3,
            flash_poll: [0xFF, 0xFF],
            eeprom_poll: [0xFF, 0xFF],
            page_size,
            eeprom_size: 1024,
            flash_size: 32 * 1024,
        }
    }

    fn fast_timing() -> Timing {
        Timing {
            poll_attempts: 5,
            poll_interval_us: 7,
            ..Timing::default()
        }
    }

    #[test]
    fn test_addr_page_masks_and_is_idempotent() {
        assert_eq!(addr_page(0x47, 128), 0x40);
        assert_eq!(addr_page(0x47, 32), 0x40);
        assert_eq!(addr_page(0x4F, 32), 0x40);
        assert_eq!(addr_page(0x12345, 0), 0x12345);
        for size in [0u16, 2, 4, 32, 64, 128, 256] {
            for addr in [0u32, 1, 0x3F, 0x40, 0x7FFF, 0x1_2345] {
                let once = addr_page(addr, size);
                assert_eq!(addr_page(once, size), once);
            }
        }
    }

    #[test]
    fn test_fill_oversized_leaves_buffer() {
        let mut buf = PageBuffer::new();
        buf.fill_from_slice(&[1, 2, 3]).unwrap();
        let mut calls = 0;
        let res = buf.fill_with(PAGE_CAPACITY + 1, || {
            calls += 1;
            Ok(0)
        });
        assert_eq!(res, Err(Error::Oversized));
        assert_eq!(calls, 0);
        assert_eq!(buf.as_slice(), [1, 2, 3]);
    }

    #[test]
    fn test_write_flash_commits_per_page() {
        let mut target = IspTarget::new(ScriptBus::default(), fast_timing());
        // 4-byte pages: two words per page, start mid-page
        let report = target
            .write_flash(&device(4, false), 1, &[0x11, 0x22, 0x33, 0x44])
            .unwrap();
        assert_eq!(report, WriteReport::default());
        assert_eq!(
            target.bus().instructions,
            [
                [0x40, 0x00, 0x01, 0x11],
                [0x48, 0x00, 0x01, 0x22],
                [0x4C, 0x00, 0x00, 0x00],
                [0x40, 0x00, 0x02, 0x33],
                [0x48, 0x00, 0x02, 0x44],
                [0x4C, 0x00, 0x02, 0x00],
            ]
        );
        assert_eq!(target.bus().delays, [10_000, 10_000]);
    }

    #[test]
    fn test_flash_poll_skips_final_byte() {
        let mut bus = ScriptBus::default();
        bus.read_value = 0x33;
        let mut target = IspTarget::new(bus, fast_timing());
        target
            .write_flash(&device(128, true), 0, &[0x11, 0x22, 0x33, 0x44])
            .unwrap();
        let reads: Vec<_> = target
            .bus()
            .instructions
            .iter()
            .filter(|i| i[0] == 0x20 || i[0] == 0x28)
            .copied()
            .collect();
        // Polls word 1 low byte (0x33), never the final high byte (0x44)
        assert_eq!(reads, [[0x20, 0x00, 0x01, 0x00]]);
    }

    #[test]
    fn test_flash_commit_waits_for_final_byte_after_poll() {
        let mut bus = ScriptBus::default();
        bus.read_value = 0x33;
        let mut target = IspTarget::new(bus, fast_timing());
        let report = target
            .write_flash(&device(128, true), 0, &[0x11, 0x22, 0x33, 0x44])
            .unwrap();
        assert_eq!(report, WriteReport { polled: 1, timeouts: 0 });
        // One poll interval, then the flat delay for the final byte
        assert_eq!(target.bus().delays, [7, 10_000]);
    }

    #[test]
    fn test_flash_poll_timeout_counted_once() {
        let mut target = IspTarget::new(ScriptBus::default(), fast_timing());
        let report = target
            .write_flash(&device(128, true), 0, &[0x11, 0x22, 0x33, 0x44])
            .unwrap();
        assert_eq!(report.timeouts, 1);
        assert_eq!(target.bus().delays, [7, 7, 7, 7, 7, 10_000]);
    }

    #[test]
    fn test_flash_range_checked() {
        let mut target = IspTarget::new(ScriptBus::default(), fast_timing());
        // 32 KiB part has 0x4000 words
        assert_eq!(
            target.write_flash(&device(128, false), 0x3FFF, &[1, 2, 3, 4]),
            Err(Error::AddressOutOfBounds)
        );
        let mut out = [0u8; 2];
        assert_eq!(
            target.read_flash(Some(&device(128, false)), 0x4000, &mut out),
            Err(Error::AddressOutOfBounds)
        );
        // Without parameters only the 16-bit word range is reachable
        assert_eq!(
            target.read_flash(None, 0x1_0000, &mut out),
            Err(Error::AddressOutOfBounds)
        );
        assert!(target.bus().instructions.is_empty());
        target.read_flash(None, 0xFFFF, &mut out).unwrap();
        assert_eq!(target.bus().instructions.len(), 2);
    }

    #[test]
    fn test_read_eeprom_range_checked() {
        let mut target = IspTarget::new(ScriptBus::default(), fast_timing());
        let dev = device(128, false);
        let mut out = [0u8; 8];
        assert_eq!(
            target.read_eeprom(Some(&dev), 1020, &mut out),
            Err(Error::AddressOutOfBounds)
        );
        assert_eq!(
            target.read_eeprom(None, 0xFFFC, &mut out),
            Err(Error::AddressOutOfBounds)
        );
        assert!(target.bus().instructions.is_empty());
        target.read_eeprom(Some(&dev), 1016, &mut out).unwrap();
        assert_eq!(target.bus().instructions.len(), 8);
    }

    #[test]
    fn test_flash_poll_falls_back_without_candidate() {
        let mut target = IspTarget::new(ScriptBus::default(), fast_timing());
        // Every byte but the last is a poll value
        target
            .write_flash(&device(128, true), 0, &[0xFF, 0xFF, 0xFF, 0x12])
            .unwrap();
        assert!(target.bus().instructions.iter().all(|i| i[0] != 0x20 && i[0] != 0x28));
        assert_eq!(target.bus().delays, [10_000]);
    }

    #[test]
    fn test_eeprom_poll_bounded() {
        let mut target = IspTarget::new(ScriptBus::default(), fast_timing());
        // read_value stays 0 so the poll never matches
        let report = target.write_eeprom(&device(128, true), 0x10, &[0x5A]).unwrap();
        assert_eq!(report.timeouts, 1);
        let reads = target
            .bus()
            .instructions
            .iter()
            .filter(|i| i[0] == 0xA0)
            .count();
        assert_eq!(reads, 5);
        assert_eq!(target.bus().delays, [7, 7, 7, 7, 7, 45_000]);
    }

    #[test]
    fn test_eeprom_out_of_bounds() {
        let mut target = IspTarget::new(ScriptBus::default(), fast_timing());
        let data = [0u8; 8];
        assert_eq!(
            target.write_eeprom(&device(128, false), 1020, &data),
            Err(Error::AddressOutOfBounds)
        );
        assert!(target.bus().instructions.is_empty());
    }

    #[test]
    fn test_extended_address_emitted_once_per_segment() {
        let mut dev = device(256, false);
        dev.flash_size = 256 * 1024;
        let mut target = IspTarget::new(ScriptBus::default(), fast_timing());
        let mut out = [0u8; 4];
        target.read_flash(Some(&dev), 0x1_0000, &mut out).unwrap();
        target.read_flash(Some(&dev), 0x1_0002, &mut out).unwrap();
        let ext: Vec<_> = target
            .bus()
            .instructions
            .iter()
            .filter(|i| i[0] == 0x4D)
            .copied()
            .collect();
        assert_eq!(ext, [[0x4D, 0x00, 0x01, 0x00]]);
    }

    #[test]
    fn test_read_flash_odd_length() {
        let mut target = IspTarget::new(ScriptBus::default(), fast_timing());
        let mut out = [0u8; 3];
        target.read_flash(None, 0x20, &mut out).unwrap();
        assert_eq!(
            target.bus().instructions,
            [
                [0x20, 0x00, 0x20, 0x00],
                [0x28, 0x00, 0x20, 0x00],
                [0x20, 0x00, 0x21, 0x00],
            ]
        );
    }
}
