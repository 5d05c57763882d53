//! Error types for Linux GPIO operations

use gpiocdev::line::Offset;
use thiserror::Error;

/// Linux GPIO specific errors
#[derive(Debug, Error)]
pub enum LinuxGpioError {
    /// Failed to request GPIO lines
    #[error("Failed to request GPIO lines: {0}")]
    LineRequestFailed(#[source] gpiocdev::Error),

    /// Failed to reconfigure GPIO lines
    #[error("Failed to reconfigure GPIO lines: {0}")]
    ReconfigureFailed(#[source] gpiocdev::Error),

    /// Failed to set GPIO line value
    #[error("Failed to set GPIO line value: {0}")]
    SetValueFailed(#[source] gpiocdev::Error),

    /// GPIO chip not specified
    #[error("No GPIO chip specified")]
    NoDevice,

    /// The same line was assigned to two signals
    #[error("GPIO line {line} is used for both {first} and {second}")]
    DuplicateLine {
        line: Offset,
        first: &'static str,
        second: &'static str,
    },
}

/// Result type for Linux GPIO operations
pub type Result<T> = std::result::Result<T, LinuxGpioError>;
