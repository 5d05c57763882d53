//! Programmer hardware traits and abstractions
//!
//! This module defines the traits that every bus and reset backend
//! implements, plus the helpers for bitbanged buses.

pub mod bitbang;
mod traits;

pub use bitbang::{BitbangBus, BitbangSpiMaster};
pub use traits::*;
