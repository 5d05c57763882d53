//! STK500 (v1) protocol definitions
//!
//! Wire constants, parameter blocks, command parsing and reply framing.

pub mod command;
pub mod frame;
pub mod params;
pub mod protocol;

pub use command::{ByteSource, Command, Memory, SliceSource};
pub use frame::{Frame, Framing, Reply, Status};
pub use params::{DeviceCaps, DeviceParameters, ExtendedParameters, ProgrammerParameters};
