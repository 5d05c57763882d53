//! netisp-linux-spi - Linux spidev programming bus
//!
//! This crate clocks the AVR serial programming interface through a
//! hardware SPI controller using the Linux spidev interface
//! (`/dev/spidevX.Y`). The target's reset is not part of the SPI
//! controller; pair this bus with a GPIO reset line.
//!
//! # Example
//!
//! ```no_run
//! use netisp_core::programmer::IspBus;
//! use netisp_linux_spi::{LinuxSpi, LinuxSpiConfig};
//!
//! let mut spi = LinuxSpi::open(&LinuxSpiConfig::new("/dev/spidev0.0").with_speed(250_000))?;
//! let echo = spi.transfer(0xAC)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Clock speed
//!
//! The target samples the programming interface with its own clock; SCK
//! must stay below a quarter of the target's CPU clock. The default of
//! 300 kHz is safe for parts running from 1.2 MHz up.
//!
//! # System Requirements
//!
//! - Linux kernel with spidev support (`CONFIG_SPI_SPIDEV`)
//! - Access to `/dev/spidevX.Y` devices (may require root or udev rules)

pub mod device;
pub mod error;

// Re-exports
pub use device::{LinuxSpi, LinuxSpiConfig};
pub use error::{LinuxSpiError, Result};
