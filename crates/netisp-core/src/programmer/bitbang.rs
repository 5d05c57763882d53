//! Bitbang bus support
//!
//! This module provides the trait for implementing the programming bus by
//! toggling three GPIO lines (clock, data out, data in), and an adapter
//! that turns any such implementation into an [`IspBus`].
//!
//! ## When to use these traits
//!
//! Use them for backends without a hardware SPI controller, such as
//! `linux_gpio` or a microcontroller's GPIO port. Hardware SPI backends
//! (e.g. `linux_spi`) should implement [`IspBus`] directly.
//!
//! The AVR serial programming interface samples MOSI on the rising edge of
//! SCK and shifts MISO out on the falling edge (SPI mode 0, MSB first).

use super::IspBus;
use crate::error::Result;

/// Trait for low-level bitbang operations
///
/// This trait provides the minimal set of operations needed to clock the
/// AVR programming interface by hand.
pub trait BitbangSpiMaster {
    /// Set clock line value
    fn set_sck(&mut self, high: bool);

    /// Set MOSI line value
    fn set_mosi(&mut self, high: bool);

    /// Get MISO line value
    fn get_miso(&self) -> bool;

    /// Delay for half a clock period
    fn half_period_delay(&self);

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);

    /// Optional: Set SCK and get MISO atomically (optimization)
    ///
    /// Default implementation calls `set_sck` then `get_miso`.
    fn set_sck_get_miso(&mut self, sck: bool) -> bool {
        self.set_sck(sck);
        self.get_miso()
    }

    /// Optional: Drive the bus lines before programming
    fn request_bus(&mut self) -> Result<()> {
        Ok(())
    }

    /// Optional: Stop driving the bus lines
    fn release_bus(&mut self) {}
}

/// Bitbang helper functions for single-wire I/O
///
/// These are standalone functions that can be used by any `BitbangSpiMaster` implementation.
pub mod single {
    use super::BitbangSpiMaster;

    /// Exchange a byte in SPI mode 0 (MSB first)
    ///
    /// SCK is left low on return.
    pub fn transfer_byte<M: BitbangSpiMaster + ?Sized>(master: &mut M, byte: u8) -> u8 {
        let mut out = byte;
        let mut byte_in = 0u8;
        for _ in 0..8 {
            master.set_mosi(out & 0x80 != 0);
            out <<= 1;
            master.half_period_delay();
            master.set_sck(true);
            master.half_period_delay();
            byte_in <<= 1;
            if master.get_miso() {
                byte_in |= 1;
            }
            master.set_sck(false);
        }
        byte_in
    }
}

/// Adapter exposing a [`BitbangSpiMaster`] as an [`IspBus`]
pub struct BitbangBus<M> {
    master: M,
    claimed: bool,
}

impl<M: BitbangSpiMaster> BitbangBus<M> {
    /// Wrap a bitbang master
    pub fn new(master: M) -> Self {
        Self {
            master,
            claimed: false,
        }
    }

    /// Get a reference to the wrapped master
    pub fn inner(&self) -> &M {
        &self.master
    }

    /// Unwrap the bitbang master
    pub fn into_inner(self) -> M {
        self.master
    }
}

impl<M: BitbangSpiMaster> IspBus for BitbangBus<M> {
    fn transfer(&mut self, byte: u8) -> Result<u8> {
        Ok(single::transfer_byte(&mut self.master, byte))
    }

    fn delay_us(&mut self, us: u32) {
        self.master.delay_us(us);
    }

    fn claim(&mut self) -> Result<()> {
        self.master.request_bus()?;
        self.master.set_sck(false);
        self.master.set_mosi(false);
        self.claimed = true;
        Ok(())
    }

    fn release(&mut self) {
        if !self.claimed {
            return;
        }
        self.master.set_mosi(true);
        self.master.release_bus();
        self.claimed = false;
    }
}
