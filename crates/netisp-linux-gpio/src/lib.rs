//! netisp-linux-gpio - Linux GPIO programming bus and reset line
//!
//! This crate drives the AVR serial programming interface by bitbanging
//! GPIO lines through the Linux character device interface (gpiocdev), and
//! drives the target's reset line.
//!
//! # Example
//!
//! ```no_run
//! use netisp_core::programmer::BitbangBus;
//! use netisp_linux_gpio::{LinuxGpioBitbang, LinuxGpioBitbangConfig};
//! use netisp_linux_gpio::{LinuxGpioReset, LinuxGpioResetConfig};
//!
//! //                                          device          SCK MOSI MISO
//! let config = LinuxGpioBitbangConfig::new("/dev/gpiochip0", 11, 10, 9).with_speed_hz(100_000);
//! let bus = BitbangBus::new(LinuxGpioBitbang::open(&config)?);
//! let reset = LinuxGpioReset::open(&LinuxGpioResetConfig::new("/dev/gpiochip0", 25))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Wiring
//!
//! | AVR Pin | GPIO Function  | Description |
//! |---------|----------------|-------------|
//! | SCK     | SCK (output)   | Serial clock |
//! | MOSI    | MOSI (output)  | Data to target |
//! | MISO    | MISO (input)   | Data from target |
//! | RESET   | reset (output) | Held low while programming |
//! | GND     | GND            | Common ground |
//!
//! The target's I/O voltage must match the GPIO bank (3.3 V on most boards).
//!
//! # System Requirements
//!
//! - Linux kernel 4.8+ with GPIO character device support (kernel 5.5+ for v2 API)
//! - Access to `/dev/gpiochipN` devices (may require root or udev rules)

pub mod device;
pub mod error;
pub mod reset;

// Re-exports
pub use device::{chip_path, LinuxGpioBitbang, LinuxGpioBitbangConfig};
pub use error::{LinuxGpioError, Result};
pub use reset::{LinuxGpioReset, LinuxGpioResetConfig};
