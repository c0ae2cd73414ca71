//! SFDP (Serial Flash Discoverable Parameters) parsing
//!
//! Geometry discovery only needs the SFDP header, the first parameter header
//! and the first two DWORDs of the Basic Flash Parameter Table (JESD216).
//! Reading is done by the driver; this module only decodes bytes.

use crate::error::{Error, Result};

/// SFDP signature "SFDP" in little-endian
pub const SFDP_SIGNATURE: u32 = 0x50444653;

/// Bytes read at SFDP address 0: header plus first parameter header
pub const SFDP_PROBE_LEN: usize = 16;

/// Bytes read at the BFPT pointer: DWORD1 and DWORD2
pub const BFPT_PROBE_LEN: usize = 8;

/// SFDP revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SfdpRevision {
    /// Major revision
    pub major: u8,
    /// Minor revision
    pub minor: u8,
}

/// SFDP header (8 bytes at address 0)
#[derive(Debug, Clone, Copy, Default)]
pub struct SfdpHeader {
    /// SFDP signature (should be 0x50444653)
    pub signature: u32,
    /// SFDP revision
    pub revision: SfdpRevision,
    /// Number of parameter headers (0-based, so actual count is nph + 1)
    pub nph: u8,
    /// Access protocol (0xFF for legacy)
    pub access_protocol: u8,
}

impl SfdpHeader {
    /// Parse SFDP header from raw bytes
    pub fn parse(data: &[u8; 8]) -> Self {
        Self {
            signature: u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
            revision: SfdpRevision {
                minor: data[4],
                major: data[5],
            },
            nph: data[6],
            access_protocol: data[7],
        }
    }

    /// Check if the signature is valid
    pub fn is_valid(&self) -> bool {
        self.signature == SFDP_SIGNATURE
    }
}

/// Parameter header structure (8 bytes each, starting at address 0x08)
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterHeader {
    /// Parameter ID (MSB << 8 | LSB)
    pub id: u16,
    /// Parameter table revision
    pub revision: SfdpRevision,
    /// Parameter table length in DWORDs
    pub length_dwords: u8,
    /// Parameter table pointer (24-bit byte address)
    pub table_pointer: u32,
}

impl ParameterHeader {
    /// Parse a parameter header from raw bytes
    pub fn parse(data: &[u8; 8]) -> Self {
        Self {
            id: ((data[7] as u16) << 8) | (data[0] as u16),
            revision: SfdpRevision {
                minor: data[1],
                major: data[2],
            },
            length_dwords: data[3],
            table_pointer: u32::from_le_bytes([data[4], data[5], data[6], 0]),
        }
    }
}

/// Address bytes supported, BFPT DWORD1 bits 18:17
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressBytes {
    /// 3-byte addressing only
    ThreeOnly,
    /// 3-byte by default, 4-byte available
    ThreeOrFour,
    /// 4-byte addressing only
    FourOnly,
    /// Reserved encoding
    Reserved,
}

impl AddressBytes {
    fn from_dword1(dword1: u32) -> Self {
        match (dword1 >> 17) & 0x3 {
            0 => Self::ThreeOnly,
            1 => Self::ThreeOrFour,
            2 => Self::FourOnly,
            _ => Self::Reserved,
        }
    }

    /// Whether 4-byte addressing is usable
    pub fn supports_4byte(&self) -> bool {
        !matches!(self, Self::ThreeOnly)
    }
}

/// Capacity and addressing discovered from SFDP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Capacity in bytes
    pub size: u32,
    /// Whether the part can be addressed with 4 bytes
    pub supports_4byte: bool,
}

/// Decode the 16 bytes read at SFDP address 0
///
/// Returns the byte address of the first parameter table.
pub fn parse_probe(data: &[u8; SFDP_PROBE_LEN]) -> Result<u32> {
    let mut header = [0u8; 8];
    header.copy_from_slice(&data[..8]);
    if !SfdpHeader::parse(&header).is_valid() {
        return Err(Error::SfdpInvalid);
    }
    let mut param = [0u8; 8];
    param.copy_from_slice(&data[8..]);
    Ok(ParameterHeader::parse(&param).table_pointer)
}

/// Decode BFPT DWORD1 and DWORD2 into a [`Geometry`]
///
/// DWORD2 bit 31 selects the 2^N density form, which is rejected.
pub fn parse_bfpt(data: &[u8; BFPT_PROBE_LEN]) -> Result<Geometry> {
    let dword1 = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let dword2 = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if dword2 & (1 << 31) != 0 {
        return Err(Error::SfdpUnsupportedDensity);
    }
    Ok(Geometry {
        size: (dword2 + 1) >> 3,
        supports_4byte: AddressBytes::from_dword1(dword1).supports_4byte(),
    })
}
