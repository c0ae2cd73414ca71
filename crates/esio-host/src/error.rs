//! Error types for host-side flash operations

use alloc::string::String;

#[cfg(feature = "std")]
use esio_core::error::describe_status;
#[cfg(feature = "std")]
use thiserror::Error;

/// Faults reported by a [`DebugTarget`](crate::target::DebugTarget) transport
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Error))]
pub enum TargetError {
    /// Memory access failed
    #[cfg_attr(feature = "std", error("memory access at 0x{addr:08X} ({len} bytes) failed"))]
    MemoryAccess { addr: u32, len: usize },

    /// No working area of the requested size
    #[cfg_attr(feature = "std", error("no working area of {0} bytes available"))]
    NoWorkingArea(usize),

    /// The core did not stop within the allowed time
    #[cfg_attr(feature = "std", error("algorithm did not exit within {0} ms"))]
    AlgorithmTimeout(u32),

    /// Transport-specific failure
    #[cfg_attr(feature = "std", error("debug transport: {0}"))]
    Transport(String),
}

/// Host-side errors
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(Error))]
pub enum HostError {
    /// The target must be halted for this operation
    #[cfg_attr(feature = "std", error("target not halted"))]
    NotHalted,

    /// The bank has not been probed yet
    #[cfg_attr(feature = "std", error("flash bank not probed"))]
    NotProbed,

    /// The working area could not be placed where the resident program runs
    #[cfg_attr(feature = "std", error("resource not available: {0}"))]
    ResourceUnavailable(String),

    /// The resident program reported a failure code
    #[cfg_attr(
        feature = "std",
        error("flash operation failed, status 0x{0:02X} ({desc})", desc = status_text(.0))
    )]
    Failure(u8),

    /// The resident program stayed busy past the global timeout
    #[cfg_attr(feature = "std", error("flash operation timed out after {0} ms"))]
    Timeout(u32),

    /// On-chip flash answered with an unexpected id
    #[cfg_attr(
        feature = "std",
        error("on-chip flash ID mismatch: expected 0x{expected:08x}, got 0x{found:08x}")
    )]
    IdMismatch { expected: u32, found: u32 },

    /// No chip of that name in the database
    #[cfg_attr(feature = "std", error("unknown eSIO chip name: {0}"))]
    UnknownChip(String),

    /// Base address does not map to a flash port on this series
    #[cfg_attr(feature = "std", error("invalid flash bank address 0x{base:08x} for {series}"))]
    InvalidBase { base: u32, series: &'static str },

    /// Range outside the probed flash
    #[cfg_attr(
        feature = "std",
        error("range 0x{offset:08x}+0x{len:x} exceeds flash size 0x{size:x}")
    )]
    OutOfRange { offset: u32, len: usize, size: u32 },

    /// Request runs past the 32-bit flash address space
    #[cfg_attr(feature = "std", error("range 0x{addr:08x}+0x{len:x} overflows the flash address space"))]
    AddressOverflow { addr: u32, len: usize },

    /// Sector range outside the probed flash
    #[cfg_attr(feature = "std", error("sectors {first}..={last} outside 0..{count}"))]
    InvalidSectors {
        first: usize,
        last: usize,
        count: usize,
    },

    /// Read-back differs from the expected data
    #[cfg_attr(
        feature = "std",
        error("verify failed at offset 0x{offset:08x}: expected 0x{expected:02x}, found 0x{found:02x}")
    )]
    VerifyMismatch { offset: u32, expected: u8, found: u8 },

    /// Resident image missing or unusable
    #[cfg_attr(feature = "std", error("resident image: {0}"))]
    Image(String),

    /// Transport fault
    #[cfg_attr(feature = "std", error("target error: {0}"))]
    Target(#[cfg_attr(feature = "std", from)] TargetError),
}

#[cfg(not(feature = "std"))]
impl From<TargetError> for HostError {
    fn from(e: TargetError) -> Self {
        HostError::Target(e)
    }
}

#[cfg(feature = "std")]
fn status_text(code: &u8) -> &'static str {
    describe_status(*code)
}

/// Result type for host operations
pub type Result<T> = core::result::Result<T, HostError>;

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_failure_message_names_status() {
        let msg = HostError::Failure(0xFE).to_string();
        assert!(msg.contains("0xFE"), "{msg}");
        assert!(msg.contains("timeout"), "{msg}");
    }

    #[test]
    fn test_target_error_converts() {
        let e: HostError = TargetError::NoWorkingArea(0x2014).into();
        assert_eq!(e, HostError::Target(TargetError::NoWorkingArea(0x2014)));
    }
}
