//! Error types for esio-core
//!
//! The resident program has no way to report text, so every error maps onto a
//! single status byte written back into the mailbox (see [`Error::status_code`]).

use core::fmt;

/// Mailbox status written for failures without a more specific code
pub const STATUS_GENERIC_FAILURE: u8 = 0xFF;
/// Mailbox status for a status-register poll that ran out of time
pub const STATUS_TIMEOUT: u8 = 0xFE;
/// Mailbox status for a missing or unusable SFDP table
pub const STATUS_SFDP_INVALID: u8 = 0xFD;
/// Mailbox status for a JEDEC id that reads as all zeros or all ones
pub const STATUS_BAD_JEDEC_ID: u8 = 0xFC;
/// Mailbox status for a port code outside the defined set
pub const STATUS_INVALID_PORT: u8 = 0xFB;
/// Mailbox status for a request length larger than the data buffer
pub const STATUS_INVALID_LENGTH: u8 = 0xFA;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Write-in-progress bit did not clear within the allowed time
    Timeout,
    /// SFDP signature missing
    SfdpInvalid,
    /// SFDP density uses the 2^N encoding, which is not handled
    SfdpUnsupportedDensity,
    /// JEDEC id read back as 0x000000 or 0xFFFFFF
    InvalidJedecId,
    /// Port code outside the defined set
    InvalidPort(u8),
    /// Valid port that the running engine cannot drive
    UnsupportedPort(u8),
    /// Request length exceeds the data buffer
    InvalidLength(u32),
    /// Command code the resident program does not serve
    UnsupportedCommand(u8),
    /// Transaction shape the engine cannot issue
    TransferTooLong,
}

impl Error {
    /// Status byte reported through the mailbox for this error
    pub const fn status_code(&self) -> u8 {
        match self {
            Self::Timeout => STATUS_TIMEOUT,
            Self::SfdpInvalid | Self::SfdpUnsupportedDensity => STATUS_SFDP_INVALID,
            Self::InvalidJedecId => STATUS_BAD_JEDEC_ID,
            Self::InvalidPort(_) => STATUS_INVALID_PORT,
            Self::InvalidLength(_) => STATUS_INVALID_LENGTH,
            Self::UnsupportedPort(_) | Self::UnsupportedCommand(_) | Self::TransferTooLong => {
                STATUS_GENERIC_FAILURE
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "flash busy timeout"),
            Self::SfdpInvalid => write!(f, "SFDP signature not found"),
            Self::SfdpUnsupportedDensity => write!(f, "SFDP density encoding not supported"),
            Self::InvalidJedecId => write!(f, "invalid JEDEC ID"),
            Self::InvalidPort(port) => write!(f, "invalid flash port 0x{:02X}", port),
            Self::UnsupportedPort(port) => write!(f, "port 0x{:02X} not available on this controller", port),
            Self::InvalidLength(len) => write!(f, "invalid request length {}", len),
            Self::UnsupportedCommand(cmd) => write!(f, "unsupported command {}", cmd),
            Self::TransferTooLong => write!(f, "SPI transfer too long for controller"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

/// Human-readable description of a mailbox status byte
///
/// Used by the host to turn a terminal state into a diagnostic.
pub const fn describe_status(code: u8) -> &'static str {
    match code {
        0x00 => "idle",
        0x01 => "busy",
        STATUS_TIMEOUT => "flash busy timeout",
        STATUS_SFDP_INVALID => "SFDP table missing or unsupported",
        STATUS_BAD_JEDEC_ID => "no flash responding (bad JEDEC ID)",
        STATUS_INVALID_PORT => "invalid port code",
        STATUS_INVALID_LENGTH => "request length exceeds buffer",
        STATUS_GENERIC_FAILURE => "unsupported request or generic failure",
        _ => "unknown failure",
    }
}
