//! FIU engine for the NCT6692D generation
//!
//! This FIU has no extended data buffer and no `ECTS.ADDR_SIZE` field. The
//! address phase is either three bytes or, with `EXT_CFG.FOUR_BADDR`, four.
//! Long writes hold chip select low and stream the payload as a sequence of
//! UMA transactions in which the opcode register carries the first data
//! byte: five bytes per burst through `UMA_CODE + DB0..3`, or nine when the
//! address registers are borrowed as four more payload bytes.

use crate::error::{Error, Result};
use crate::hal::HardwareAccess;
use crate::mailbox::Port;
use crate::regs::*;
use crate::spi::{opcodes, AddressWidth, SpiCommand};

use super::{CommandEngine, EngineFeatures, EngineKind};

/// Largest burst using the address registers as payload
const WIDE_BURST: usize = 9;
/// Largest burst through opcode and data registers
const NARROW_BURST: usize = 5;

/// FIU without extended data buffer
pub struct LegacyFiu<H> {
    hw: H,
}

impl<H: HardwareAccess> LegacyFiu<H> {
    /// Wrap a bus
    pub fn new(hw: H) -> Self {
        Self { hw }
    }

    /// Release the bus
    pub fn into_inner(self) -> H {
        self.hw
    }

    fn set8(&mut self, off: u32, value: u8) {
        self.hw.write8(FIU_BASE + off, value)
    }

    fn run(&mut self, cts: UmaCts) {
        self.set8(FIU_UMA_CTS, cts.bits());
        while UmaCts::from_bits_retain(self.hw.read8(FIU_BASE + FIU_UMA_CTS))
            .contains(UmaCts::EXEC_DONE)
        {}
    }

    fn load_data(&mut self, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            self.set8(FIU_UMA_DB0 + i as u32, b);
        }
    }

    fn unload_data(&mut self, buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.hw.read8(FIU_BASE + FIU_UMA_DB0 + i as u32);
        }
    }

    fn set_four_baddr(&mut self, enable: bool) {
        if enable {
            self.hw.set_bits8(FIU_BASE + FIU_EXT_CFG, EXT_CFG_FOUR_BADDR);
        } else {
            self.hw.clear_bits8(FIU_BASE + FIU_EXT_CFG, EXT_CFG_FOUR_BADDR);
        }
    }

    fn short(&mut self, port: Port, cmd: &mut SpiCommand<'_>) {
        let dev = dev_select(port);
        self.set8(FIU_UMA_ECTS, CS_RELEASED.bits());
        self.hw.clear_bits8(FIU_BASE + FIU_MSR_IE_CFG, MSR_IE_CFG_UMA_BLOCK);
        self.set8(FIU_UMA_CODE, cmd.opcode);

        let mut cts = UmaCts::EXEC_DONE | dev;
        let four = cmd.address_width == AddressWidth::FourByte;
        if let Some(addr) = cmd.address {
            self.hw.write32(FIU_BASE + FIU_UMA_AB0_3, addr);
            self.set_four_baddr(four);
            cts |= UmaCts::A_SIZE;
        }
        if cmd.has_write() {
            self.load_data(cmd.write_data);
            cts = (cts | UmaCts::RD_WR).with_data_size(cmd.write_data.len());
        } else {
            cts = cts.with_data_size(cmd.read_buf.len());
        }
        self.run(cts);
        self.unload_data(cmd.read_buf);

        if four {
            self.set_four_baddr(false);
        }
    }

    fn framed(&mut self, port: Port, cmd: &mut SpiCommand<'_>) {
        let dev = dev_select(port);
        self.set8(FIU_UMA_ECTS, manual_cs(port).bits());
        self.hw.set_bits8(FIU_BASE + FIU_MSR_IE_CFG, MSR_IE_CFG_UMA_BLOCK);
        self.set8(FIU_UMA_CODE, cmd.opcode);

        match cmd.address {
            Some(addr) => {
                self.hw.write32(FIU_BASE + FIU_UMA_AB0_3, addr);
                self.set_four_baddr(cmd.address_width == AddressWidth::FourByte);
                self.run(UmaCts::EXEC_DONE | UmaCts::A_SIZE | dev);
            }
            None => self.run(UmaCts::EXEC_DONE | dev),
        }

        // Wide bursts send the address registers as four payload bytes
        self.set_four_baddr(true);
        let mut rest = cmd.write_data;
        while !rest.is_empty() {
            let n = if rest.len() >= WIDE_BURST {
                WIDE_BURST
            } else {
                rest.len().min(NARROW_BURST)
            };
            let (burst, tail) = rest.split_at(n);
            self.set8(FIU_UMA_CODE, burst[0]);
            if n == WIDE_BURST {
                let wide = u32::from_be_bytes([burst[1], burst[2], burst[3], burst[4]]);
                self.hw.write32(FIU_BASE + FIU_UMA_AB0_3, wide);
                self.load_data(&burst[5..]);
                self.run((UmaCts::EXEC_DONE | UmaCts::RD_WR | UmaCts::A_SIZE | dev).with_data_size(4));
            } else {
                self.load_data(&burst[1..]);
                self.run((UmaCts::EXEC_DONE | UmaCts::RD_WR | dev).with_data_size(n - 1));
            }
            rest = tail;
        }

        for chunk in cmd.read_buf.chunks_mut(4) {
            self.run((UmaCts::EXEC_DONE | UmaCts::C_SIZE | dev).with_data_size(chunk.len()));
            self.unload_data(chunk);
        }

        self.set8(FIU_UMA_ECTS, CS_RELEASED.bits());
        self.hw.clear_bits8(FIU_BASE + FIU_MSR_IE_CFG, MSR_IE_CFG_UMA_BLOCK);
        self.set_four_baddr(false);
    }
}

/// Both chip selects released
const CS_RELEASED: UmaEcts = UmaEcts::SW_CS0.union(UmaEcts::SW_CS1);

fn dev_select(port: Port) -> UmaCts {
    if port == Port::Pvt {
        UmaCts::empty()
    } else {
        UmaCts::DEV_NUM
    }
}

fn manual_cs(port: Port) -> UmaEcts {
    if port == Port::Pvt {
        UmaEcts::SW_CS1
    } else {
        UmaEcts::SW_CS0
    }
}

impl<H: HardwareAccess> CommandEngine for LegacyFiu<H> {
    type Bus = H;

    fn bus(&mut self) -> &mut H {
        &mut self.hw
    }

    fn kind(&self) -> EngineKind {
        EngineKind::LegacyFiu
    }

    fn supports_port(&self, port: Port) -> bool {
        matches!(port, Port::Pvt | Port::Shd)
    }

    fn features(&self, port: Port) -> EngineFeatures {
        match port {
            Port::Shd => {
                EngineFeatures::SFDP_INIT | EngineFeatures::PORT_SETUP | EngineFeatures::MAPPED_READ
            }
            _ => EngineFeatures::MAPPED_READ,
        }
    }

    fn open_port(&mut self, port: Port, _quad: bool) {
        let hw = &mut self.hw;
        match port {
            Port::Pvt => {
                hw.write8(SCFG_BASE + SCFG_DEVCNT, LEGACY_DEVCNT_PVT);
                hw.write8(SCFG_BASE + SCFG_DEVALTC, LEGACY_DEVALTC_PVT);
            }
            Port::Shd => {
                hw.write8(SCFG_BASE + SCFG_DEVCNT, LEGACY_DEVCNT_SHD);
                hw.write8(SCFG_BASE + SCFG_DEVALTC, LEGACY_DEVALTC_SHD);
                hw.write8(FIU_BASE + FIU_BURST_CFG, BURST_CFG_DEFAULT);
                hw.modify8(
                    FIU_BASE + FIU_SPI_FL_CFG,
                    SPI_FL_CFG_RD_MODE_MASK,
                    SPI_FL_CFG_RD_MODE_DUAL_IO,
                );
            }
            _ => {}
        }
    }

    fn execute(&mut self, port: Port, cmd: &mut SpiCommand<'_>) -> Result<()> {
        if !self.supports_port(port) {
            return Err(Error::UnsupportedPort(port.code()));
        }
        if cmd.has_read() && cmd.has_write() {
            return Err(Error::TransferTooLong);
        }
        if cmd.fits_single_transfer() {
            self.short(port, cmd);
        } else {
            self.framed(port, cmd);
        }
        Ok(())
    }

    fn read_mapped(&mut self, port: Port, addr: u32, buf: &mut [u8], use_4byte: bool) -> Result<()> {
        if port != Port::Shd {
            self.hw.read_block(FIU_WINDOW_BASE + addr, buf);
            return Ok(());
        }
        if use_4byte {
            self.hw
                .set_bits8(FIU_BASE + FIU_EXT_CFG, EXT_CFG_SET_CMD_EN | EXT_CFG_FOUR_BADDR);
            self.set8(FIU_LEGACY_RD_CMD, opcodes::DIOR_4B);
        }
        self.hw.read_block(LEGACY_SHD_WINDOW + addr, buf);
        if use_4byte {
            self.hw
                .clear_bits8(FIU_BASE + FIU_EXT_CFG, EXT_CFG_SET_CMD_EN | EXT_CFG_FOUR_BADDR);
            self.set8(FIU_LEGACY_RD_CMD, 0);
        }
        Ok(())
    }

    fn program_timeout_ms(&self) -> u32 {
        50
    }
}
