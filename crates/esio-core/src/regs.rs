//! Nuvoton eSIO register definitions
//!
//! Register offsets and bit definitions for the blocks the flash algorithms
//! touch: the Flash Interface Unit (FIU), the on-die SPI master (SPIM), the
//! system configuration block (SCFG), the clock generator (HFCG) and the
//! general-purpose DMA engine (GDMA).
//!
//! # Generations
//!
//! - NCT6692D: legacy FIU, PVT and SHD ports, mapped windows at 0x60000000
//!   and 0x64000000
//! - NCT6694D: FIU with the 16-byte extended data window and a BKP port,
//!   plus the SPIM for on-die flash

use bitflags::bitflags;

// ============================================================================
// FIU
// ============================================================================

/// FIU register block base
pub const FIU_BASE: u32 = 0x4002_0000;

/// FIU configuration
pub const FIU_CFG: u32 = 0x00;
/// Burst configuration
pub const FIU_BURST_CFG: u32 = 0x01;
/// Response configuration
pub const FIU_RESP_CFG: u32 = 0x02;
/// SPI flash configuration (mapped read mode)
pub const FIU_SPI_FL_CFG: u32 = 0x14;
/// UMA command code
pub const FIU_UMA_CODE: u32 = 0x16;
/// UMA address byte 0 (least significant)
pub const FIU_UMA_AB0: u32 = 0x17;
/// UMA address byte 1
pub const FIU_UMA_AB1: u32 = 0x18;
/// UMA address byte 2
pub const FIU_UMA_AB2: u32 = 0x19;
/// UMA data byte 0
pub const FIU_UMA_DB0: u32 = 0x1A;
/// UMA data byte 1
pub const FIU_UMA_DB1: u32 = 0x1B;
/// UMA data byte 2
pub const FIU_UMA_DB2: u32 = 0x1C;
/// UMA data byte 3
pub const FIU_UMA_DB3: u32 = 0x1D;
/// UMA control and status
pub const FIU_UMA_CTS: u32 = 0x1E;
/// UMA extended control and status
pub const FIU_UMA_ECTS: u32 = 0x1F;
/// UMA data bytes 0-3 as one 32-bit word
pub const FIU_UMA_DB0_3: u32 = 0x20;
/// Mapped read opcode for the BKP port
pub const FIU_RD_CMD_BKP: u32 = 0x2E;
/// Mapped read opcode for the PVT port
pub const FIU_RD_CMD_PVT: u32 = 0x30;
/// Mapped read opcode of the NCT6692D FIU, a single register shared by
/// both ports at the NCT6694D PVT offset
pub const FIU_LEGACY_RD_CMD: u32 = FIU_RD_CMD_PVT;
/// Mapped read opcode for the SHD port
pub const FIU_RD_CMD_SHD: u32 = 0x31;
/// Extended configuration
pub const FIU_EXT_CFG: u32 = 0x33;
/// UMA address bytes 0-3 as one 32-bit word (AB0 in the low byte)
pub const FIU_UMA_AB0_3: u32 = 0x34;
/// Per-port enable for the `RD_CMD_*` overrides
pub const FIU_SET_CMD_EN: u32 = 0x3C;
/// Master interrupt enable and configuration
pub const FIU_MSR_IE_CFG: u32 = 0x43;
/// Quad program enable
pub const FIU_Q_P_EN: u32 = 0x44;
/// Extended data buffer configuration
pub const FIU_EXT_DB_CFG: u32 = 0x48;
/// Extended data buffer (16 bytes)
pub const FIU_UMA_EXT_DB: u32 = 0x50;
/// Size of the extended data buffer
pub const FIU_EXT_DB_SIZE: usize = 16;

/// Burst configuration used for normal operation
pub const BURST_CFG_DEFAULT: u8 = 0x03;
/// Burst configuration used while GDMA bursts from a mapped window
pub const BURST_CFG_GDMA: u8 = 0x0B;

// RESP_CFG bits
/// Quad mode enable for mapped reads
pub const RESP_CFG_QUAD_EN: u8 = 1 << 3;

// SPI_FL_CFG bits
/// Read mode field shift
pub const SPI_FL_CFG_RD_MODE_SHIFT: u8 = 6;
/// Read mode field mask
pub const SPI_FL_CFG_RD_MODE_MASK: u8 = 0b11 << SPI_FL_CFG_RD_MODE_SHIFT;
/// Dual I/O mapped read mode
pub const SPI_FL_CFG_RD_MODE_DUAL_IO: u8 = 0b11 << SPI_FL_CFG_RD_MODE_SHIFT;

// EXT_CFG bits
/// Mapped reads send 4 address bytes
pub const EXT_CFG_FOUR_BADDR: u8 = 1 << 0;
/// Honour the `RD_CMD_*` override registers
pub const EXT_CFG_SET_CMD_EN: u8 = 1 << 1;

// SET_CMD_EN bits
/// Override enable for the PVT port
pub const SET_CMD_EN_PVT: u8 = 1 << 4;
/// Override enable for the SHD port
pub const SET_CMD_EN_SHD: u8 = 1 << 5;
/// Override enable for the BKP port
pub const SET_CMD_EN_BKP: u8 = 1 << 6;

// MSR_IE_CFG bits
/// Block UMA accesses while set
pub const MSR_IE_CFG_UMA_BLOCK: u8 = 1 << 3;

// EXT_DB_CFG bits
/// Use the extended data buffer for the data phase
pub const EXT_DB_CFG_EN: u8 = 1 << 5;
/// Extended data size mask
pub const EXT_DB_CFG_D_SIZE_MASK: u8 = 0x1F;

/// Base of the FIU memory-mapped read windows
pub const FIU_WINDOW_BASE: u32 = 0x6000_0000;
/// Stride between FIU read windows, one per port
pub const FIU_WINDOW_STRIDE: u32 = 0x1000_0000;
/// Address bits decoded inside a window
pub const FIU_WINDOW_MASK: u32 = 0x1FFF_FFFF;
/// Legacy FIU window for the SHD port
pub const LEGACY_SHD_WINDOW: u32 = 0x6400_0000;

bitflags! {
    /// UMA_CTS register
    ///
    /// The low three bits hold the data byte count of the transaction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UmaCts: u8 {
        /// Write 1 to start, reads 1 until the transaction is done
        const EXEC_DONE = 1 << 7;
        /// Device select (0 = CS0, 1 = CS1 or CS2)
        const DEV_NUM = 1 << 6;
        /// Data phase direction (1 = write)
        const RD_WR = 1 << 5;
        /// Suppress the command byte
        const C_SIZE = 1 << 4;
        /// Send an address phase
        const A_SIZE = 1 << 3;
        /// Data size field
        const D_SIZE = 0b111;
    }
}

impl UmaCts {
    /// Control word with the given data byte count
    pub fn with_data_size(self, len: usize) -> Self {
        (self - Self::D_SIZE) | Self::from_bits_retain(len as u8 & Self::D_SIZE.bits())
    }

    /// Data byte count carried in the control word
    pub fn data_size(&self) -> usize {
        (self.bits() & Self::D_SIZE.bits()) as usize
    }
}

bitflags! {
    /// UMA_ECTS register
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UmaEcts: u8 {
        /// Address byte count override (bits 4-6)
        const ADDR_SIZE = 0b111 << 4;
        /// With `CTS.DEV_NUM`, select CS2 instead of CS1
        const DEV_NUM_BKP = 1 << 3;
        /// Software chip select for CS2 (0 = asserted)
        const SW_CS2 = 1 << 2;
        /// Software chip select for CS1 (0 = asserted)
        const SW_CS1 = 1 << 1;
        /// Software chip select for CS0 (0 = asserted)
        const SW_CS0 = 1 << 0;
    }
}

impl UmaEcts {
    /// All software chip selects released
    pub const ALL_CS_RELEASED: Self = Self::SW_CS0.union(Self::SW_CS1).union(Self::SW_CS2);

    /// Register value with the address byte count replaced
    pub fn with_addr_size(self, bytes: u8) -> Self {
        (self - Self::ADDR_SIZE) | Self::from_bits_retain((bytes & 0b111) << 4)
    }

    /// Address byte count carried in the register
    pub fn addr_size(&self) -> u8 {
        (self.bits() & Self::ADDR_SIZE.bits()) >> 4
    }
}

// ============================================================================
// SCFG
// ============================================================================

/// System configuration block base
pub const SCFG_BASE: u32 = 0x400C_3000;
/// Device control
pub const SCFG_DEVCNT: u32 = 0x00;
/// Device control 3
pub const SCFG_DEV_CTL3: u32 = 0x04;
/// Device control 4
pub const SCFG_DEV_CTL4: u32 = 0x06;
/// Device alternate function 0
pub const SCFG_DEVALT0: u32 = 0x10;
/// Device alternate function C
pub const SCFG_DEVALTC: u32 = 0x1C;

/// DEVCNT: shared SPI pins tri-stated
pub const DEVCNT_SHD_SPI_TRIS: u8 = 1 << 6;
/// DEV_CTL3: pin mux bit cleared for every FIU port
pub const DEV_CTL3_FIU_MUX: u8 = 1 << 1;
/// DEV_CTL4: shared flash switched to the AMD eSPI master
pub const DEV_CTL4_AMD_EN: u8 = 1 << 2;
/// DEVALT0: private chip select pin
pub const DEVALT0_PVT_CS_SL: u8 = 1 << 1;
/// DEVALT0: backup chip select pin
pub const DEVALT0_BKP_CS_SL: u8 = 1 << 2;
/// DEVALTC: shared SPI pins
pub const DEVALTC_SHD_SPI: u8 = 1 << 3;
/// DEVALTC: shared SPI quad pins
pub const DEVALTC_SHD_SPI_QUAD: u8 = 1 << 2;

/// Legacy DEVCNT value selecting the private flash
pub const LEGACY_DEVCNT_PVT: u8 = 0x40;
/// Legacy DEVALTC value selecting the private flash
pub const LEGACY_DEVALTC_PVT: u8 = 0x10;
/// Legacy DEVCNT value selecting the shared flash
pub const LEGACY_DEVCNT_SHD: u8 = 0x00;
/// Legacy DEVALTC value selecting the shared flash
pub const LEGACY_DEVALTC_SHD: u8 = 0x28;

// ============================================================================
// HFCG
// ============================================================================

/// High frequency clock generator base
pub const HFCG_BASE: u32 = 0x400B_5000;
/// Bus clock divider 1
pub const HFCG_BCD1: u32 = 0x12;
/// BCD1: FIU clock divider field
pub const BCD1_FIUDIV_MASK: u8 = 0b11;
/// FIU clock divider programmed at port open
pub const FIUDIV_DEFAULT: u8 = 3;

// ============================================================================
// GDMA
// ============================================================================

/// GDMA channel 0 base
pub const GDMA_BASE: u32 = 0x4001_1000;
/// Channel 0 control
pub const GDMA_CTL0: u32 = 0x00;
/// Channel 0 source base
pub const GDMA_SRCB0: u32 = 0x04;
/// Channel 0 destination base
pub const GDMA_DSTB0: u32 = 0x08;
/// Channel 0 transfer count
pub const GDMA_TCNT0: u32 = 0x0C;

/// Byte-wide transfer, channel enabled
pub const GDMA_CTL_BYTE: u32 = 0x0001_0001;
/// 16-byte burst transfer, channel enabled
pub const GDMA_CTL_BURST: u32 = 0x0001_2201;
/// Channel enable / busy
pub const GDMA_CTL_GDMAEN: u32 = 1 << 0;
/// Granule of a burst transfer
pub const GDMA_BURST_UNIT: u32 = 16;
/// Alignment a run must satisfy to use bursts
pub const GDMA_BURST_ALIGN_MASK: u32 = 0x0F;
/// Bursts move multiples of this many bytes
pub const GDMA_BURST_CHUNK: u32 = 64;

// ============================================================================
// SPIM
// ============================================================================

/// SPIM register block base
pub const SPIM_BASE: u32 = 0x4001_7000;
/// Control 0
pub const SPIM_CTL0: u32 = 0x00;
/// Control 1
pub const SPIM_CTL1: u32 = 0x04;
/// Receive data words 0-3
pub const SPIM_RX0: u32 = 0x10;
/// Transmit data words 0-3
pub const SPIM_TX0: u32 = 0x20;
/// DMA SRAM address
pub const SPIM_SRAMADDR: u32 = 0x30;
/// DMA byte count
pub const SPIM_DMACNT: u32 = 0x34;
/// DMA flash address
pub const SPIM_FADDR: u32 = 0x38;

/// CTL0: command code shift
pub const SPIM_CTL0_CMDCODE_SHIFT: u32 = 24;
/// CTL0: operation mode shift
pub const SPIM_CTL0_OPMODE_SHIFT: u32 = 22;
/// CTL0: operation mode mask
pub const SPIM_CTL0_OPMODE_MASK: u32 = 0b11 << SPIM_CTL0_OPMODE_SHIFT;
/// CTL0: bit mode shift
pub const SPIM_CTL0_BITMODE_SHIFT: u32 = 20;
/// CTL0: bit mode mask
pub const SPIM_CTL0_BITMODE_MASK: u32 = 0b11 << SPIM_CTL0_BITMODE_SHIFT;
/// CTL0: quad/dual data direction (1 = output)
pub const SPIM_CTL0_QDIODIR: u32 = 1 << 15;
/// CTL0: burst number shift (transfers - 1)
pub const SPIM_CTL0_BURSTNUM_SHIFT: u32 = 13;
/// CTL0: burst number mask
pub const SPIM_CTL0_BURSTNUM_MASK: u32 = 0b11 << SPIM_CTL0_BURSTNUM_SHIFT;
/// CTL0: data width shift (bits - 1)
pub const SPIM_CTL0_DWIDTH_SHIFT: u32 = 8;
/// CTL0: data width mask
pub const SPIM_CTL0_DWIDTH_MASK: u32 = 0x1F << SPIM_CTL0_DWIDTH_SHIFT;
/// CTL0: bypass the cipher
pub const SPIM_CTL0_CIPHOFF: u32 = 1 << 0;
/// CTL0: DMA write flag bits used with page program
pub const SPIM_CTL0_DMA_PP: u32 = 0x02;

/// Normal I/O mode
pub const SPIM_OPMODE_NORMAL: u32 = 0;
/// DMA write mode
pub const SPIM_OPMODE_DMA_WRITE: u32 = 1;

/// CTL1: clock divider shift
pub const SPIM_CTL1_DIVIDER_SHIFT: u32 = 16;
/// CTL1: clock divider mask
pub const SPIM_CTL1_DIVIDER_MASK: u32 = 0xFF << SPIM_CTL1_DIVIDER_SHIFT;
/// CTL1: slave select (0 = chip select asserted)
pub const SPIM_CTL1_SS: u32 = 1 << 4;
/// CTL1: invalidate the read cache
pub const SPIM_CTL1_CDINVAL: u32 = 1 << 3;
/// CTL1: start transfer, reads 1 while busy
pub const SPIM_CTL1_SPIMEN: u32 = 1 << 0;

/// Divider programmed at start (48 MHz)
pub const SPIM_DIVIDER_DEFAULT: u32 = 1;
/// Largest page a single DMA write may carry
pub const SPIM_DMA_MAX: usize = 256;

/// Bus address of the on-die flash behind the SPIM
pub const SPIM_FLASH_BASE: u32 = 0x0008_0000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cts_data_size_field() {
        let cts = (UmaCts::EXEC_DONE | UmaCts::RD_WR).with_data_size(4);
        assert_eq!(cts.bits(), 0xA4);
        assert_eq!(cts.data_size(), 4);
        assert_eq!(cts.with_data_size(1).bits(), 0xA1);
    }

    #[test]
    fn test_ects_addr_size_field() {
        let ects = UmaEcts::ALL_CS_RELEASED.with_addr_size(4);
        assert_eq!(ects.bits(), 0x47);
        assert_eq!(ects.addr_size(), 4);
        assert_eq!(ects.with_addr_size(0), UmaEcts::ALL_CS_RELEASED);
    }
}
