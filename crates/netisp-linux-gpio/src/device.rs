//! Linux GPIO bitbang bus implementation
//!
//! This module provides `LinuxGpioBitbang`, which implements the
//! `BitbangSpiMaster` trait using Linux's GPIO character device interface
//! (gpiocdev). Wrap it in a `BitbangBus` to get an `IspBus`.
//!
//! While the bus is released, clock and data out are switched to inputs so
//! the target's pins are free for the running firmware.

use crate::error::{LinuxGpioError, Result};

use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};

use netisp_core::error::{Error as CoreError, Result as CoreResult};
use netisp_core::programmer::BitbangSpiMaster;

/// Default half-period delay in nanoseconds (for ~100 kHz SPI clock)
const DEFAULT_HALF_PERIOD_NS: u64 = 5000;

/// Expand a bare chip number to its device path
///
/// `"0"` becomes `"/dev/gpiochip0"`; anything else is taken as a path.
pub fn chip_path(chip: &str) -> String {
    if !chip.is_empty() && chip.bytes().all(|b| b.is_ascii_digit()) {
        format!("/dev/gpiochip{}", chip)
    } else {
        chip.to_string()
    }
}

/// Configuration for opening a Linux GPIO bitbang bus
#[derive(Debug, Clone)]
pub struct LinuxGpioBitbangConfig {
    /// Device path (e.g., "/dev/gpiochip0")
    pub device: String,
    /// SCK (Clock) GPIO line offset
    pub sck: Offset,
    /// MOSI (Master Out Slave In) GPIO line offset
    pub mosi: Offset,
    /// MISO (Master In Slave Out) GPIO line offset
    pub miso: Offset,
    /// Half-period delay in nanoseconds
    pub half_period_ns: u64,
}

impl Default for LinuxGpioBitbangConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            sck: 0,
            mosi: 0,
            miso: 0,
            half_period_ns: DEFAULT_HALF_PERIOD_NS,
        }
    }
}

impl LinuxGpioBitbangConfig {
    /// Create a new configuration with the given device path and pins
    pub fn new(device: impl Into<String>, sck: Offset, mosi: Offset, miso: Offset) -> Self {
        Self {
            device: device.into(),
            sck,
            mosi,
            miso,
            ..Default::default()
        }
    }

    /// Set the half-period delay in nanoseconds
    pub fn with_half_period_ns(mut self, ns: u64) -> Self {
        self.half_period_ns = ns;
        self
    }

    /// Set SPI speed in Hz (approximate, via half-period calculation)
    pub fn with_speed_hz(mut self, hz: u32) -> Self {
        // half_period = 1_000_000_000 / (2 * frequency) in nanoseconds
        if hz > 0 {
            self.half_period_ns = 500_000_000 / hz as u64;
        }
        self
    }

    /// Check that a chip is given and no line is used twice
    pub fn validate(&self) -> Result<()> {
        if self.device.is_empty() {
            return Err(LinuxGpioError::NoDevice);
        }
        let lines = [("sck", self.sck), ("mosi", self.mosi), ("miso", self.miso)];
        for (i, &(first, line)) in lines.iter().enumerate() {
            if let Some(&(second, _)) = lines[i + 1..].iter().find(|(_, l)| *l == line) {
                return Err(LinuxGpioError::DuplicateLine {
                    line,
                    first,
                    second,
                });
            }
        }
        Ok(())
    }
}

/// AVR programming bus bitbanged on three GPIO lines
pub struct LinuxGpioBitbang {
    /// GPIO line request handle
    request: Request,
    sck: Offset,
    mosi: Offset,
    miso: Offset,
    /// Half-period delay in nanoseconds
    half_period_ns: u64,
}

impl LinuxGpioBitbang {
    /// Open the lines with the given configuration, released
    pub fn open(config: &LinuxGpioBitbangConfig) -> Result<Self> {
        config.validate()?;

        log::debug!("linux_gpio: Opening device {}", config.device);

        // Everything starts as input until programming mode is entered
        let mut req_config = Config::default();
        req_config.with_line(config.sck).as_input();
        req_config.with_line(config.mosi).as_input();
        req_config.with_line(config.miso).as_input();

        let request = Request::from_config(req_config)
            .on_chip(&config.device)
            .with_consumer("netisp")
            .request()
            .map_err(LinuxGpioError::LineRequestFailed)?;

        log::info!(
            "linux_gpio: Opened {} (sck={}, mosi={}, miso={}, half period {} ns)",
            config.device,
            config.sck,
            config.mosi,
            config.miso,
            config.half_period_ns
        );

        Ok(Self {
            request,
            sck: config.sck,
            mosi: config.mosi,
            miso: config.miso,
            half_period_ns: config.half_period_ns,
        })
    }

    /// Line configuration with clock and data out driven or floating
    fn lines(&self, drive: bool) -> Config {
        let mut cfg = Config::default();
        if drive {
            cfg.with_line(self.sck).as_output(Value::Inactive);
            cfg.with_line(self.mosi).as_output(Value::Inactive);
        } else {
            cfg.with_line(self.sck).as_input();
            cfg.with_line(self.mosi).as_input();
        }
        cfg.with_line(self.miso).as_input();
        cfg
    }

    fn set_line(&self, offset: Offset, high: bool, name: &str) {
        let value = if high { Value::Active } else { Value::Inactive };
        if let Err(e) = self.request.set_value(offset, value) {
            log::error!("Failed to set {}: {}", name, e);
        }
    }
}

impl BitbangSpiMaster for LinuxGpioBitbang {
    fn set_sck(&mut self, high: bool) {
        self.set_line(self.sck, high, "SCK");
    }

    fn set_mosi(&mut self, high: bool) {
        self.set_line(self.mosi, high, "MOSI");
    }

    fn get_miso(&self) -> bool {
        match self.request.value(self.miso) {
            Ok(Value::Active) => true,
            Ok(Value::Inactive) => false,
            Err(e) => {
                log::error!("Failed to get MISO: {}", e);
                false
            }
        }
    }

    fn half_period_delay(&self) {
        if self.half_period_ns > 0 {
            std::thread::sleep(std::time::Duration::from_nanos(self.half_period_ns));
        }
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(std::time::Duration::from_micros(us as u64));
    }

    fn request_bus(&mut self) -> CoreResult<()> {
        self.request
            .reconfigure(&self.lines(true))
            .map(|_| ())
            .map_err(|e| {
                log::error!("{}", LinuxGpioError::ReconfigureFailed(e));
                CoreError::BusTransferFailed
            })
    }

    fn release_bus(&mut self) {
        if let Err(e) = self.request.reconfigure(&self.lines(false)) {
            log::error!("Failed to release bus lines: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chip_path() {
        assert_eq!(chip_path("0"), "/dev/gpiochip0");
        assert_eq!(chip_path("12"), "/dev/gpiochip12");
        assert_eq!(chip_path("/dev/gpiochip4"), "/dev/gpiochip4");
        assert_eq!(chip_path(""), "");
    }

    #[test]
    fn test_speed_to_half_period() {
        let config = LinuxGpioBitbangConfig::new("/dev/gpiochip0", 11, 10, 9).with_speed_hz(250_000);
        assert_eq!(config.half_period_ns, 2000);
        let config = config.with_speed_hz(0);
        assert_eq!(config.half_period_ns, 2000);
    }

    #[test]
    fn test_validate() {
        assert!(LinuxGpioBitbangConfig::new("/dev/gpiochip0", 11, 10, 9).validate().is_ok());
        assert!(matches!(
            LinuxGpioBitbangConfig::new("", 11, 10, 9).validate(),
            Err(LinuxGpioError::NoDevice)
        ));
        assert!(matches!(
            LinuxGpioBitbangConfig::new("/dev/gpiochip0", 11, 10, 11).validate(),
            Err(LinuxGpioError::DuplicateLine {
                line: 11,
                first: "sck",
                second: "miso"
            })
        ));
    }
}
