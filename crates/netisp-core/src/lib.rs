//! netisp-core - STK500 in-system programming core
//!
//! This crate implements the STK500 (v1) command interpreter, the AVR
//! serial programming algorithms and the connection state machine of a
//! network programmer. Hardware and transport are reached through traits
//! so the same core runs against Linux devices, an emulated target, or a
//! microcontroller HAL.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`)
//! - `alloc` - Enable trait impls for boxed buses and reset lines
//!
//! # Example
//!
//! ```ignore
//! use netisp_core::{Interpreter, InterpreterConfig, Programmer};
//!
//! let interpreter = Interpreter::new(bus, reset, InterpreterConfig::default())?;
//! let mut programmer = Programmer::new(listener, interpreter);
//! loop {
//!     programmer.serve()?;
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod error;
pub mod interpreter;
pub mod isp;
pub mod memory;
pub mod programmer;
pub mod session;
pub mod state;
pub mod stk500;

pub use error::{Error, Result};
pub use interpreter::{Interpreter, InterpreterConfig};
pub use memory::{PageBuffer, Timing, PAGE_CAPACITY};
pub use session::{ConnectionManager, Listener, Session};
pub use state::{Programmer, ProgrammerState};
pub use stk500::Framing;
