//! Error types for netisp-core
//!
//! This module provides a no_std compatible error type shared by the
//! interpreter, the programming algorithms and the bus/session traits.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Bus errors
    /// Byte exchange on the programming bus failed
    BusTransferFailed,
    /// Driving the reset line failed
    ResetFailed,

    // Target errors
    /// Target did not acknowledge the programming enable instruction
    NoDevice,
    /// Operation requires programming mode to be entered first
    NotInProgMode,

    // Protocol errors
    /// Requested length exceeds the page buffer capacity
    Oversized,
    /// Page size is neither zero nor a power of two within buffer capacity
    InvalidPageSize,
    /// Device parameters have not been set
    NoDeviceParameters,
    /// Memory cursor has not been loaded
    NoAddress,
    /// Access lies outside the target memory
    AddressOutOfBounds,
    /// Frame was shorter than its command requires
    Truncated,
    /// Parameter id is read-only or unknown
    InvalidParameter,
    /// Memory type byte is neither 'F' nor 'E'
    InvalidMemoryType,

    // Session errors
    /// Client closed the connection
    Disconnected,
    /// Client read or write timed out
    Timeout,
    /// Unrecoverable transport fault
    Network,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BusTransferFailed => write!(f, "bus transfer failed"),
            Self::ResetFailed => write!(f, "failed to drive reset line"),
            Self::NoDevice => write!(f, "target did not acknowledge programming enable"),
            Self::NotInProgMode => write!(f, "not in programming mode"),
            Self::Oversized => write!(f, "length exceeds page buffer capacity"),
            Self::InvalidPageSize => write!(f, "invalid page size"),
            Self::NoDeviceParameters => write!(f, "device parameters not set"),
            Self::NoAddress => write!(f, "address not loaded"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::Truncated => write!(f, "frame truncated"),
            Self::InvalidParameter => write!(f, "parameter is read-only or unknown"),
            Self::InvalidMemoryType => write!(f, "invalid memory type"),
            Self::Disconnected => write!(f, "client disconnected"),
            Self::Timeout => write!(f, "client timed out"),
            Self::Network => write!(f, "network error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl Error {
    /// Whether this error ends the client session
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Network)
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
