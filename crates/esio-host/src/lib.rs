//! esio-host - Host side of the eSIO resident flash programmer
//!
//! Drives a resident program through its mailbox over any debug transport.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CLI (bin/esioflash)                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  FlashBank: base -> port, probe, erase/program/read/verify  │
//! │  OperationSequencer: chunking, submit, poll, teardown       │
//! │  LoaderController: working area, image, start/stop          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  DebugTarget
//!                              ▼
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │  debug probe backend     │   │  esio-sim (simulated)    │
//! └──────────────────────────┘   └──────────────────────────┘
//! ```
//!
//! # Features
//!
//! - `std` - chip database files, image directories and `thiserror` errors
//! - `is_sync` - compile the `maybe_async` code as blocking

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(rust_2018_idioms)]

extern crate alloc;

pub mod bank;
pub mod chips;
pub mod error;
pub mod loader;
pub mod progress;
pub mod sequencer;
pub mod target;

#[cfg(all(test, feature = "is_sync"))]
mod test_support;

pub use bank::{BankConfig, FlashBank, FlashSector, PortSelection, ProbedFlash};
pub use chips::{ChipDatabase, ChipInfo, EsioSeries};
pub use error::{HostError, Result, TargetError};
#[cfg(feature = "std")]
pub use loader::ImageDir;
pub use loader::{ImageProvider, LoaderController, LoaderSession, StaticImages};
pub use progress::{BankProgress, NoProgress};
pub use sequencer::{OperationSequencer, SequencerConfig, DEFAULT_TIMEOUT_MS};
pub use target::{DebugTarget, WorkingArea};
