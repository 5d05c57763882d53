//! Linux SPI device implementation
//!
//! This module provides the `LinuxSpi` struct that implements the `IspBus`
//! trait using Linux's spidev interface. Chip select is toggled by the
//! controller on every byte but the target ignores it; leave it unwired.

use crate::error::{LinuxSpiError, Result};

use netisp_core::error::{Error as CoreError, Result as CoreResult};
use netisp_core::programmer::IspBus;

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

/// Default SPI clock speed in Hz (300 kHz)
pub const DEFAULT_SPEED_HZ: u32 = 300_000;

/// SPI mode used by the AVR serial programming interface (CPOL=0, CPHA=0)
pub const AVR_SPI_MODE: u8 = 0;

/// Linux spidev ioctl constants
mod ioctl {
    use nix::ioctl_write_ptr;

    // SPI ioctl magic number
    const SPI_IOC_MAGIC: u8 = b'k';

    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );

    /// Size of spi_ioc_transfer struct
    pub const SPI_IOC_TRANSFER_SIZE: usize = 32;

    /// Calculate ioctl number for SPI_IOC_MESSAGE(n)
    pub fn spi_ioc_message(n: u8) -> libc::c_ulong {
        let size = (n as usize) * SPI_IOC_TRANSFER_SIZE;
        // _IOC(_IOC_WRITE, type, nr, size) with _IOC_WRITE = 1
        ((1u32 << 30) | ((size as u32) << 16) | ((SPI_IOC_MAGIC as u32) << 8)) as libc::c_ulong
    }
}

/// SPI transfer structure for ioctl
/// This must match the kernel's struct spi_ioc_transfer layout
#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,          // __u64 tx_buf
    rx_buf: u64,          // __u64 rx_buf
    len: u32,             // __u32 len
    speed_hz: u32,        // __u32 speed_hz
    delay_usecs: u16,     // __u16 delay_usecs
    bits_per_word: u8,    // __u8 bits_per_word
    cs_change: u8,        // __u8 cs_change
    tx_nbits: u8,         // __u8 tx_nbits
    rx_nbits: u8,         // __u8 rx_nbits
    word_delay_usecs: u8, // __u8 word_delay_usecs
    _pad: u8,             // padding
}

/// Configuration for opening a Linux SPI device
#[derive(Debug, Clone)]
pub struct LinuxSpiConfig {
    /// Device path (e.g., "/dev/spidev0.0")
    pub device: String,
    /// SPI clock speed in Hz (default: 300 kHz)
    pub speed_hz: u32,
    /// SPI mode (0-3, default: 0)
    pub mode: u8,
}

impl Default for LinuxSpiConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            speed_hz: DEFAULT_SPEED_HZ,
            mode: AVR_SPI_MODE,
        }
    }
}

impl LinuxSpiConfig {
    /// Create a new configuration with the given device path
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Set the SPI clock speed in Hz
    pub fn with_speed(mut self, speed_hz: u32) -> Self {
        self.speed_hz = speed_hz;
        self
    }

    /// Set the SPI mode (0-3)
    pub fn with_mode(mut self, mode: u8) -> Self {
        self.mode = mode;
        self
    }

    /// Reject settings the controller cannot be opened with
    pub fn validate(&self) -> Result<()> {
        if self.device.is_empty() {
            return Err(LinuxSpiError::NoDevice);
        }
        if self.speed_hz == 0 {
            return Err(LinuxSpiError::InvalidParameter(
                "clock speed must be non-zero".into(),
            ));
        }
        if self.mode > 3 {
            return Err(LinuxSpiError::InvalidParameter(format!(
                "SPI mode {} out of range",
                self.mode
            )));
        }
        Ok(())
    }
}

/// AVR programming bus on a Linux spidev controller
pub struct LinuxSpi {
    /// File handle for spidev device
    file: File,
    /// Current speed in Hz
    speed_hz: u32,
}

impl LinuxSpi {
    /// Open a Linux SPI device with the given configuration
    pub fn open(config: &LinuxSpiConfig) -> Result<Self> {
        config.validate()?;

        log::debug!("linux_spi: Opening device {}", config.device);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.device)
            .map_err(|e| LinuxSpiError::OpenFailed {
                path: config.device.clone(),
                source: e,
            })?;

        let fd = file.as_raw_fd();

        let mode = config.mode;
        unsafe {
            ioctl::spi_ioc_wr_mode(fd, &mode).map_err(|e| LinuxSpiError::SetModeFailed {
                mode,
                source: std::io::Error::from_raw_os_error(e as i32),
            })?;
        }

        let bits: u8 = 8;
        unsafe {
            ioctl::spi_ioc_wr_bits_per_word(fd, &bits).map_err(|e| {
                LinuxSpiError::SetBitsPerWordFailed {
                    bits,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }

        let speed = config.speed_hz;
        unsafe {
            ioctl::spi_ioc_wr_max_speed_hz(fd, &speed).map_err(|e| {
                LinuxSpiError::SetSpeedFailed {
                    speed,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }

        log::info!(
            "linux_spi: Opened {} (mode={}, speed={} kHz)",
            config.device,
            mode,
            speed / 1000
        );

        Ok(Self {
            file,
            speed_hz: speed,
        })
    }

    /// Clock `tx` out while filling `rx` in one full-duplex message
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        if tx.is_empty() || tx.len() != rx.len() {
            return Err(LinuxSpiError::InvalidParameter(
                "transmit and receive buffers must be the same non-zero length".into(),
            ));
        }

        let transfer = SpiIocTransfer {
            tx_buf: tx.as_ptr() as u64,
            rx_buf: rx.as_mut_ptr() as u64,
            len: tx.len() as u32,
            speed_hz: self.speed_hz,
            bits_per_word: 8,
            ..Default::default()
        };

        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                ioctl::spi_ioc_message(1),
                &transfer as *const SpiIocTransfer,
            )
        };

        if ret < 0 {
            return Err(LinuxSpiError::TransferFailed(
                std::io::Error::last_os_error(),
            ));
        }

        Ok(())
    }
}

impl IspBus for LinuxSpi {
    fn transfer(&mut self, byte: u8) -> CoreResult<u8> {
        let mut rx = [0u8; 1];
        self.exchange(&[byte], &mut rx).map_err(|e| {
            log::error!("linux_spi: {}", e);
            CoreError::BusTransferFailed
        })?;
        Ok(rx[0])
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(std::time::Duration::from_micros(us as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_struct_matches_kernel_layout() {
        assert_eq!(
            std::mem::size_of::<SpiIocTransfer>(),
            ioctl::SPI_IOC_TRANSFER_SIZE
        );
        assert_eq!(ioctl::spi_ioc_message(1), 0x4020_6b00);
    }

    #[test]
    fn test_config_defaults() {
        let config = LinuxSpiConfig::new("/dev/spidev0.0");
        assert_eq!(config.speed_hz, DEFAULT_SPEED_HZ);
        assert_eq!(config.mode, AVR_SPI_MODE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            LinuxSpiConfig::new("").validate(),
            Err(LinuxSpiError::NoDevice)
        ));
        assert!(matches!(
            LinuxSpiConfig::new("/dev/spidev0.0").with_speed(0).validate(),
            Err(LinuxSpiError::InvalidParameter(_))
        ));
        assert!(matches!(
            LinuxSpiConfig::new("/dev/spidev0.0").with_mode(4).validate(),
            Err(LinuxSpiError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_open_missing_device() {
        let err = LinuxSpi::open(&LinuxSpiConfig::new("/nonexistent/spidev9.9")).err();
        assert!(matches!(err, Some(LinuxSpiError::OpenFailed { .. })));
    }
}
