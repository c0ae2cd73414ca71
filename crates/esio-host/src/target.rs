//! Debug transport abstraction
//!
//! [`DebugTarget`] is everything the host side needs from a JTAG/SWD
//! connection: core state, memory access, working-area allocation and
//! running a downloaded algorithm. Any probe backend can implement it; the
//! workspace ships a simulated one in `esio-sim`.
//!
//! Uses `maybe_async` so the same code serves blocking and async transports:
//! - With `is_sync` feature: blocking/synchronous
//! - Without `is_sync` feature: async

use maybe_async::maybe_async;

use crate::error::TargetError;

/// Block of target RAM reserved for the resident program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingArea {
    /// Start address
    pub address: u32,
    /// Size in bytes
    pub size: usize,
}

/// A halted-or-running core reachable through a debug probe
#[maybe_async(AFIT)]
pub trait DebugTarget {
    /// Whether the core is currently halted
    fn is_halted(&mut self) -> bool;

    /// Stop the core
    async fn halt(&mut self) -> Result<(), TargetError>;

    /// Read target memory
    async fn read_memory(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), TargetError>;

    /// Write target memory
    async fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<(), TargetError>;

    /// Reserve `size` bytes of target RAM
    fn alloc_working_area(&mut self, size: usize) -> Result<WorkingArea, TargetError>;

    /// Return a working area
    fn free_working_area(&mut self, area: WorkingArea);

    /// Let the core run from `entry`
    async fn start_algorithm(&mut self, entry: u32) -> Result<(), TargetError>;

    /// Wait for a started algorithm to stop, bounded by `timeout_ms`
    async fn wait_algorithm(&mut self, timeout_ms: u32) -> Result<(), TargetError>;

    /// Service the transport during long polls
    async fn keep_alive(&mut self);

    /// Monotonic milliseconds, used to bound polls
    fn now_ms(&mut self) -> u64;

    /// Read one byte
    async fn read_u8(&mut self, addr: u32) -> Result<u8, TargetError> {
        let mut buf = [0u8; 1];
        self.read_memory(addr, &mut buf).await?;
        Ok(buf[0])
    }

    /// Read a little-endian word
    async fn read_u32(&mut self, addr: u32) -> Result<u32, TargetError> {
        let mut buf = [0u8; 4];
        self.read_memory(addr, &mut buf).await?;
        Ok(u32::from_le_bytes(buf))
    }
}
