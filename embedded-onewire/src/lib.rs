#![no_std]
#![deny(missing_docs)]
//! # embedded-onewire
//! A no-std implementation of the 1-Wire protocol.
//!
//! This crate provides a trait-based interface for 1-Wire communication, allowing you to implement the protocol on various platforms.
//! [OneWire] trait defines the basic operations required for 1-Wire communication, such as resetting the bus, writing and reading bytes,
//! writing and reading bits, and holding a strong pull-up for parasite-powered devices.
//!
//! The crate also provides the Dallas/Maxim CRC-8 in [OneWireCrc] and a search algorithm for discovering devices on the 1-Wire bus,
//! implemented in the [OneWireSearch] struct.

#[cfg(test)]
extern crate std;

pub mod consts;
mod error;
mod search;
mod traits;
mod utils;
pub use error::OneWireError;
pub use search::{OneWireSearch, OneWireSearchKind};
pub use traits::{OneWire, OneWireStatus};
pub use utils::OneWireCrc;

/// Error type for 1-Wire operations.
pub type OneWireResult<T, E> = Result<T, OneWireError<E>>;
