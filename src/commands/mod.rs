//! CLI command implementations
//!
//! Every bank command probes first when the bank has not been probed yet,
//! then runs one [`FlashBank`](esio_host::FlashBank) operation with an
//! indicatif progress reporter.

pub mod erase;
mod list;
pub mod probe;
mod progress;
pub mod read;
pub mod verify;
pub mod write;

pub use list::list_chips;
