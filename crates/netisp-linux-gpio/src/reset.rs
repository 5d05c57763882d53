//! Target reset on a GPIO line

use crate::error::{LinuxGpioError, Result};

use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};

use netisp_core::error::{Error as CoreError, Result as CoreResult};
use netisp_core::programmer::{Polarity, ResetLine};

/// Configuration for the reset line
#[derive(Debug, Clone)]
pub struct LinuxGpioResetConfig {
    /// Device path (e.g., "/dev/gpiochip0")
    pub device: String,
    /// Reset GPIO line offset
    pub line: Offset,
    /// Electrical level that holds the target in reset
    pub polarity: Polarity,
}

impl LinuxGpioResetConfig {
    /// Create a configuration for an active-low reset on `line`
    pub fn new(device: impl Into<String>, line: Offset) -> Self {
        Self {
            device: device.into(),
            line,
            polarity: Polarity::ActiveLow,
        }
    }

    /// Set the polarity (an inverting buffer in between needs active-high)
    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }
}

/// Reset line driven through gpiocdev
pub struct LinuxGpioReset {
    request: Request,
    line: Offset,
    polarity: Polarity,
}

impl LinuxGpioReset {
    /// Request the line as an output, released (target running)
    pub fn open(config: &LinuxGpioResetConfig) -> Result<Self> {
        if config.device.is_empty() {
            return Err(LinuxGpioError::NoDevice);
        }

        let mut req_config = Config::default();
        req_config
            .with_line(config.line)
            .as_output(value(config.polarity.level(false)));

        let request = Request::from_config(req_config)
            .on_chip(&config.device)
            .with_consumer("netisp-reset")
            .request()
            .map_err(LinuxGpioError::LineRequestFailed)?;

        log::info!(
            "linux_gpio: Reset on {} line {} ({:?})",
            config.device,
            config.line,
            config.polarity
        );

        Ok(Self {
            request,
            line: config.line,
            polarity: config.polarity,
        })
    }
}

fn value(high: bool) -> Value {
    if high {
        Value::Active
    } else {
        Value::Inactive
    }
}

impl ResetLine for LinuxGpioReset {
    fn set_level(&mut self, active: bool) -> CoreResult<()> {
        self.request
            .set_value(self.line, value(self.polarity.level(active)))
            .map(|_| ())
            .map_err(|e| {
                log::error!("{}", LinuxGpioError::SetValueFailed(e));
                CoreError::ResetFailed
            })
    }
}
