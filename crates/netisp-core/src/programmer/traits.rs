//! Bus and reset line trait definitions
//!
//! The interpreter only needs two pieces of hardware: a full-duplex byte
//! exchange towards the target's serial programming interface and a line
//! that holds the target in reset. Both are owned handles passed in at
//! construction.

use crate::error::Result;

/// Synchronous byte exchange with the target's programming interface
///
/// Implementations clock one byte out on MOSI while clocking one byte in
/// from MISO (SPI mode 0, MSB first), either through a hardware controller
/// or by toggling GPIO lines.
///
/// ## Example: Hardware SPI
///
/// ```ignore
/// impl IspBus for MySpi {
///     fn transfer(&mut self, byte: u8) -> Result<u8> {
///         self.hw.exchange(byte).map_err(|_| Error::BusTransferFailed)
///     }
///
///     fn delay_us(&mut self, us: u32) {
///         self.timer.delay_us(us);
///     }
/// }
/// ```
pub trait IspBus {
    /// Exchange one byte with the target
    fn transfer(&mut self, byte: u8) -> Result<u8>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);

    /// Take ownership of the bus lines before entering programming mode
    fn claim(&mut self) -> Result<()> {
        Ok(())
    }

    /// Hand the bus lines back to the target after programming mode
    fn release(&mut self) {}
}

/// Target reset line
///
/// `active` means "target held in reset"; the physical level is decided
/// by the implementation, usually through [`Polarity`].
pub trait ResetLine {
    /// Assert (`true`) or deassert (`false`) target reset
    fn set_level(&mut self, active: bool) -> Result<()>;
}

/// Electrical polarity of the reset line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    /// Reset is asserted by driving the line low (plain AVR targets)
    #[default]
    ActiveLow,
    /// Reset is asserted by driving the line high (inverting transistor stage)
    ActiveHigh,
}

impl Polarity {
    /// Physical line level for a logical reset state
    pub fn level(self, active: bool) -> bool {
        active == (self == Polarity::ActiveHigh)
    }
}

#[cfg(feature = "alloc")]
impl<T: IspBus + ?Sized> IspBus for alloc::boxed::Box<T> {
    fn transfer(&mut self, byte: u8) -> Result<u8> {
        (**self).transfer(byte)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }

    fn claim(&mut self) -> Result<()> {
        (**self).claim()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

#[cfg(feature = "alloc")]
impl<T: ResetLine + ?Sized> ResetLine for alloc::boxed::Box<T> {
    fn set_level(&mut self, active: bool) -> Result<()> {
        (**self).set_level(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polarity_level() {
        assert!(!Polarity::ActiveLow.level(true));
        assert!(Polarity::ActiveLow.level(false));
        assert!(Polarity::ActiveHigh.level(true));
        assert!(!Polarity::ActiveHigh.level(false));
    }
}
