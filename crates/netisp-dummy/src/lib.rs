//! netisp-dummy - Emulated AVR target for testing
//!
//! This crate provides an in-memory AVR that speaks the serial programming
//! instruction set, a reset line wired to it, and an in-memory client
//! connection. Together they run the whole programmer without hardware
//! or network.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod avr;
mod session;

pub use avr::{DummyAvr, DummyConfig, DummyReset};
pub use session::{DummyClient, DummyListener, DummySession};
