//! SPI types and command structures
//!
//! A transaction on every eSIO controller is opcode, optional address, then
//! either a write payload or a read phase. Dummy cycles and multi-I/O modes
//! only appear in the memory-mapped read paths, which the engines program
//! directly.

mod address;
mod command;
pub mod opcodes;

pub use address::AddressWidth;
pub use command::SpiCommand;
pub use opcodes::*;
