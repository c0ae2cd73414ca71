//! FIU engine for the NCT6694D generation
//!
//! Short commands (address plus at most four data bytes each way) use the
//! UMA registers with automatic chip select: transmit bytes are packed into
//! `UMA_AB0_3` with `ECTS.ADDR_SIZE` giving their count, received bytes come
//! back in `UMA_DB0_3`. Anything longer clears the port's software chip
//! select bit, sends opcode and address in a first transaction, then streams
//! data through the 16-byte extended data buffer or reads it four bytes at a
//! time.

use heapless::Vec;
use log::trace;

use crate::error::{Error, Result};
use crate::hal::HardwareAccess;
use crate::mailbox::Port;
use crate::regs::*;
use crate::spi::{opcodes, SpiCommand};

use super::{next_burst, CommandEngine, EngineFeatures, EngineKind};

/// FIU with extended data buffer
pub struct Fiu<H> {
    hw: H,
}

impl<H: HardwareAccess> Fiu<H> {
    /// Wrap a bus
    pub fn new(hw: H) -> Self {
        Self { hw }
    }

    /// Release the bus
    pub fn into_inner(self) -> H {
        self.hw
    }

    fn reg8(&mut self, off: u32) -> u8 {
        self.hw.read8(FIU_BASE + off)
    }

    fn set8(&mut self, off: u32, value: u8) {
        self.hw.write8(FIU_BASE + off, value)
    }

    fn wait_done(&mut self) {
        while UmaCts::from_bits_retain(self.reg8(FIU_UMA_CTS)).contains(UmaCts::EXEC_DONE) {}
    }

    fn run(&mut self, cts: UmaCts) {
        self.set8(FIU_UMA_CTS, cts.bits());
        self.wait_done();
    }

    fn set_ects(&mut self, ects: UmaEcts) {
        self.set8(FIU_UMA_ECTS, ects.bits());
    }

    fn release(&mut self) {
        self.set_ects(UmaEcts::ALL_CS_RELEASED);
        self.hw.clear_bits8(FIU_BASE + FIU_MSR_IE_CFG, MSR_IE_CFG_UMA_BLOCK);
        self.hw.clear_bits8(FIU_BASE + FIU_EXT_CFG, EXT_CFG_FOUR_BADDR);
    }

    /// Command with at most four bytes out after the opcode and four back
    fn short(&mut self, port: Port, cmd: &mut SpiCommand<'_>) -> Result<()> {
        let mut addr = [0u8; 4];
        let mut tx: Vec<u8, 4> = Vec::new();
        tx.extend_from_slice(cmd.encode_address(&mut addr))
            .map_err(|_| Error::TransferTooLong)?;
        tx.extend_from_slice(cmd.write_data)
            .map_err(|_| Error::TransferTooLong)?;
        let rx_len = cmd.read_buf.len();

        let (dev, dev_ects) = dev_select(port);
        self.hw.set_bits8(FIU_BASE + FIU_MSR_IE_CFG, MSR_IE_CFG_UMA_BLOCK);
        self.set8(FIU_UMA_CODE, cmd.opcode);

        let mut cts = UmaCts::EXEC_DONE | dev;
        if !tx.is_empty() {
            let packed = tx.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
            self.hw.write32(FIU_BASE + FIU_UMA_AB0_3, packed);
            if tx.len() == 4 {
                self.hw.set_bits8(FIU_BASE + FIU_EXT_CFG, EXT_CFG_FOUR_BADDR);
                cts |= UmaCts::A_SIZE;
            }
        }
        self.set_ects(UmaEcts::ALL_CS_RELEASED.with_addr_size(tx.len() as u8) | dev_ects);
        self.run(cts.with_data_size(rx_len));

        if rx_len > 0 {
            let word = self.hw.read32(FIU_BASE + FIU_UMA_DB0_3).to_le_bytes();
            cmd.read_buf.copy_from_slice(&word[..rx_len]);
        }
        self.release();
        Ok(())
    }

    /// Command holding chip select across several UMA transactions
    fn framed(&mut self, port: Port, cmd: &mut SpiCommand<'_>) -> Result<()> {
        let (dev, _) = dev_select(port);
        let cs = manual_cs(port);
        trace!(
            "fiu: framed 0x{:02X} port {} write {} read {}",
            cmd.opcode,
            port,
            cmd.write_data.len(),
            cmd.read_buf.len()
        );

        self.hw.set_bits8(FIU_BASE + FIU_MSR_IE_CFG, MSR_IE_CFG_UMA_BLOCK);
        self.set_ects(cs.with_addr_size(cmd.address_bytes() as u8));
        if let Some(addr) = cmd.address {
            self.hw.write32(FIU_BASE + FIU_UMA_AB0_3, addr);
        }
        self.set8(FIU_UMA_CODE, cmd.opcode);

        // Opcode and address, plus the first data byte on writes
        let mut rest = cmd.write_data;
        if let Some((&first, tail)) = cmd.write_data.split_first() {
            self.set8(FIU_UMA_DB0, first);
            self.set8(FIU_Q_P_EN, 0);
            self.run((UmaCts::EXEC_DONE | UmaCts::RD_WR | dev).with_data_size(1));
            rest = tail;
        } else {
            self.run(UmaCts::EXEC_DONE | dev);
        }
        self.set_ects(cs);

        while !rest.is_empty() {
            let n = next_burst(rest.len(), FIU_EXT_DB_SIZE, true);
            let (chunk, tail) = rest.split_at(n);
            if n == 1 {
                self.set8(FIU_UMA_DB0, chunk[0]);
                self.run((UmaCts::EXEC_DONE | UmaCts::RD_WR | UmaCts::C_SIZE | dev).with_data_size(1));
            } else {
                self.hw.write_block(FIU_BASE + FIU_UMA_EXT_DB, chunk);
                self.set8(FIU_EXT_DB_CFG, EXT_DB_CFG_EN | n as u8);
                self.run(UmaCts::EXEC_DONE | UmaCts::RD_WR | UmaCts::C_SIZE);
            }
            rest = tail;
        }
        self.set8(FIU_EXT_DB_CFG, 0);

        for chunk in cmd.read_buf.chunks_mut(4) {
            self.run((UmaCts::EXEC_DONE | UmaCts::C_SIZE | dev).with_data_size(chunk.len()));
            let word = self.hw.read32(FIU_BASE + FIU_UMA_DB0_3).to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }

        self.set8(FIU_Q_P_EN, 0);
        self.release();
        Ok(())
    }

    fn pin_select(&mut self, port: Port) {
        let hw = &mut self.hw;
        if port == Port::Shd {
            hw.clear_bits8(SCFG_BASE + SCFG_DEVCNT, DEVCNT_SHD_SPI_TRIS);
        }
        hw.set_bits8(SCFG_BASE + SCFG_DEVALTC, DEVALTC_SHD_SPI | DEVALTC_SHD_SPI_QUAD);
        hw.clear_bits8(SCFG_BASE + SCFG_DEV_CTL3, DEV_CTL3_FIU_MUX);
        match port {
            Port::Pvt => hw.set_bits8(SCFG_BASE + SCFG_DEVALT0, DEVALT0_PVT_CS_SL),
            Port::Bkp => hw.set_bits8(SCFG_BASE + SCFG_DEVALT0, DEVALT0_BKP_CS_SL),
            _ => {}
        }
    }

    fn read_cmd_reg(port: Port) -> (u32, u8) {
        match port {
            Port::Pvt => (FIU_RD_CMD_PVT, SET_CMD_EN_PVT),
            Port::Bkp => (FIU_RD_CMD_BKP, SET_CMD_EN_BKP),
            _ => (FIU_RD_CMD_SHD, SET_CMD_EN_SHD),
        }
    }
}

/// Device select bits for `port`, in CTS and ECTS
fn dev_select(port: Port) -> (UmaCts, UmaEcts) {
    match port {
        Port::Pvt => (UmaCts::empty(), UmaEcts::empty()),
        Port::Bkp => (UmaCts::DEV_NUM, UmaEcts::DEV_NUM_BKP),
        _ => (UmaCts::DEV_NUM, UmaEcts::empty()),
    }
}

/// ECTS value asserting only the chip select of `port`
fn manual_cs(port: Port) -> UmaEcts {
    match port {
        Port::Pvt => UmaEcts::SW_CS1 | UmaEcts::SW_CS2,
        Port::Bkp => UmaEcts::SW_CS0 | UmaEcts::SW_CS1 | UmaEcts::DEV_NUM_BKP,
        _ => UmaEcts::SW_CS0 | UmaEcts::SW_CS2,
    }
}

/// Address of flash offset `addr` in the memory-mapped window of `port`
pub fn window_address(port: Port, addr: u32) -> u32 {
    let index = u32::from(port.index().unwrap_or(0));
    FIU_WINDOW_BASE + FIU_WINDOW_STRIDE * index + (addr & FIU_WINDOW_MASK)
}

impl<H: HardwareAccess> CommandEngine for Fiu<H> {
    type Bus = H;

    fn bus(&mut self) -> &mut H {
        &mut self.hw
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Fiu
    }

    fn supports_port(&self, port: Port) -> bool {
        port != Port::Internal
    }

    fn features(&self, _port: Port) -> EngineFeatures {
        EngineFeatures::all()
    }

    fn open_port(&mut self, port: Port, quad: bool) {
        let hw = &mut self.hw;
        hw.modify8(HFCG_BASE + HFCG_BCD1, BCD1_FIUDIV_MASK, FIUDIV_DEFAULT);
        hw.write8(FIU_BASE + FIU_BURST_CFG, BURST_CFG_DEFAULT);
        // Shared SPI driven, enabled and owned by the FIU rather than eSPI
        hw.clear_bits8(SCFG_BASE + SCFG_DEVCNT, DEVCNT_SHD_SPI_TRIS);
        hw.set_bits8(SCFG_BASE + SCFG_DEVALTC, DEVALTC_SHD_SPI);
        hw.clear_bits8(SCFG_BASE + SCFG_DEV_CTL4, DEV_CTL4_AMD_EN);
        if quad {
            hw.set_bits8(SCFG_BASE + SCFG_DEVALTC, DEVALTC_SHD_SPI_QUAD);
        }
        self.pin_select(port);
    }

    fn execute(&mut self, port: Port, cmd: &mut SpiCommand<'_>) -> Result<()> {
        if !self.supports_port(port) {
            return Err(Error::UnsupportedPort(port.code()));
        }
        if cmd.has_read() && cmd.has_write() {
            return Err(Error::TransferTooLong);
        }
        if cmd.address_bytes() + cmd.write_data.len() <= 4 && cmd.read_buf.len() <= 4 {
            self.short(port, cmd)
        } else {
            self.framed(port, cmd)
        }
    }

    fn read_mapped(&mut self, port: Port, addr: u32, buf: &mut [u8], use_4byte: bool) -> Result<()> {
        self.hw.clear_bits8(FIU_BASE + FIU_RESP_CFG, RESP_CFG_QUAD_EN);
        // UMA commands drop FOUR_BADDR, so the latch is re-applied per read
        self.set_address_latch(port, use_4byte);
        self.set8(FIU_SPI_FL_CFG, 0);
        let src = window_address(port, addr);
        self.hw.read_block(src, buf);
        Ok(())
    }

    fn set_address_latch(&mut self, port: Port, enable: bool) {
        let (rd_cmd, en_bit) = Self::read_cmd_reg(port);
        if enable {
            self.hw.set_bits8(FIU_BASE + FIU_SET_CMD_EN, en_bit);
            self.hw.set_bits8(FIU_BASE + FIU_EXT_CFG, EXT_CFG_FOUR_BADDR);
            self.set8(rd_cmd, opcodes::READ_4B);
        } else {
            self.hw.clear_bits8(FIU_BASE + FIU_SET_CMD_EN, en_bit);
            self.hw.clear_bits8(FIU_BASE + FIU_EXT_CFG, EXT_CFG_SET_CMD_EN | EXT_CFG_FOUR_BADDR);
        }
    }

    fn program_timeout_ms(&self) -> u32 {
        10
    }
}
