//! SPI flash opcodes used by the eSIO flash algorithms
//!
//! Only the subset the resident program issues is listed here: the standard
//! JEDEC array commands, status register access and the vendor quad-enable
//! bit positions needed by quad mode switching.

// ============================================================================
// Write control
// ============================================================================

/// Write Enable - required before any write/erase operation
pub const WREN: u8 = 0x06;
/// Write Disable - clears WEL bit in status register
pub const WRDI: u8 = 0x04;

// ============================================================================
// Status register operations
// ============================================================================

/// Read Status Register 1
pub const RDSR: u8 = 0x05;
/// Read Status Register 2
pub const RDSR2: u8 = 0x35;
/// Write Status Register (SR1, optionally followed by SR2)
pub const WRSR: u8 = 0x01;

// ============================================================================
// Identification
// ============================================================================

/// Read JEDEC ID (manufacturer + device ID)
pub const RDID: u8 = 0x9F;
/// Read SFDP (JEDEC JESD216)
pub const RDSFDP: u8 = 0x5A;

// ============================================================================
// Array access
// ============================================================================

/// Read Data with 3-byte address
pub const READ: u8 = 0x03;
/// Read Data with 4-byte address
pub const READ_4B: u8 = 0x13;
/// Dual I/O Read with 4-byte address, used by the mapped window
pub const DIOR_4B: u8 = 0xBC;
/// Page Program with 3-byte address
pub const PP: u8 = 0x02;
/// Page Program with 4-byte address
pub const PP_4B: u8 = 0x12;
/// Sector Erase 4KB with 3-byte address
pub const SE_20: u8 = 0x20;
/// Sector Erase 4KB with 4-byte address
pub const SE_21: u8 = 0x21;

// ============================================================================
// 4-byte address mode control
// ============================================================================

/// Enter 4-Byte Address Mode
pub const EN4B: u8 = 0xB7;
/// Exit 4-Byte Address Mode
pub const EX4B: u8 = 0xE9;

// ============================================================================
// Status register bit definitions
// ============================================================================

/// Status Register 1: Write In Progress / Busy
pub const SR1_WIP: u8 = 0x01;
/// Status Register 1: Write Enable Latch
pub const SR1_WEL: u8 = 0x02;
/// Status Register 1: Quad Enable on Macronix and Micron parts
pub const SR1_QE: u8 = 0x40;
/// Status Register 2: Quad Enable on Winbond and GigaDevice parts
pub const SR2_QE: u8 = 0x02;

// ============================================================================
// Geometry
// ============================================================================

/// Page program granularity
pub const PAGE_SIZE: u32 = 256;
/// Sector erase granularity
pub const SECTOR_SIZE: u32 = 4096;

// ============================================================================
// Manufacturer ids with a known quad-enable location
// ============================================================================

/// Winbond
pub const MFR_WINBOND: u8 = 0xEF;
/// GigaDevice
pub const MFR_GIGADEVICE: u8 = 0xC8;
/// Macronix
pub const MFR_MACRONIX: u8 = 0xC2;
/// Micron
pub const MFR_MICRON: u8 = 0x20;

/// Where a vendor keeps its quad-enable bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadEnableBit {
    /// Bit in status register 1
    Sr1(u8),
    /// Bit in status register 2
    Sr2(u8),
}

/// Look up the quad-enable bit for a manufacturer id
pub const fn quad_enable_bit(manufacturer: u8) -> Option<QuadEnableBit> {
    match manufacturer {
        MFR_WINBOND | MFR_GIGADEVICE => Some(QuadEnableBit::Sr2(SR2_QE)),
        MFR_MACRONIX | MFR_MICRON => Some(QuadEnableBit::Sr1(SR1_QE)),
        _ => None,
    }
}
