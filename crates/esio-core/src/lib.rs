//! esio-core - Resident flash algorithm core for Nuvoton eSIO controllers
//!
//! This crate holds everything that runs inside the small bare-metal program
//! injected into target RAM, plus the mailbox contract it shares with the
//! host. It is `no_std` so the same code links into the resident firmware
//! and into the host-side simulator.
//!
//! # Layers
//!
//! - [`hal`] - register and block-copy access, injected so the protocol logic
//!   runs against real MMIO or a simulated bus
//! - [`engine`] - one SPI transaction on a given controller generation
//!   (FIU, legacy FIU, SPIM)
//! - [`driver`] - identify, geometry discovery, erase, program, read and
//!   mode switching on top of an engine
//! - [`dispatcher`] - the mailbox state machine serving host requests
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`)
//! - `alloc` - Enable heap allocation

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod dispatcher;
pub mod driver;
pub mod engine;
pub mod error;
pub mod hal;
pub mod mailbox;
pub mod mmio;
pub mod regs;
pub mod sfdp;
pub mod spi;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
