//! esio-sim - Simulated eSIO target
//!
//! Runs the resident dispatcher from `esio-core` against register-level
//! models of the FIU and SPIM controllers and a behavioural SPI-NOR part,
//! behind the same [`DebugTarget`](esio_host::DebugTarget) trait a real
//! debug probe implements. The host stack in `esio-host` drives it unchanged.
//!
//! ```text
//!  FlashBank ──DebugTarget──▶ SimTarget ──Mailbox──▶ Dispatcher<Engine<SimBus>>
//!                                                          │ HardwareAccess
//!                                                          ▼
//!                                               FiuModel / SpimModel
//!                                                          │
//!                                                          ▼
//!                                                   SpiNor per port
//! ```

#![warn(rust_2018_idioms)]

pub mod bus;
pub mod config;
pub mod fiu;
pub mod spi_nor;
pub mod spim;
pub mod target;

pub use bus::{Flashes, SimBus};
pub use config::{sim_image, sim_images, SimConfig};
pub use spi_nor::{SpiNor, SpiNorConfig};
pub use target::{SimTarget, Transaction};
