//! SPIM engine for the NCT6694D on-die flash
//!
//! Normal mode moves at most four 8-bit words per start. Chip select stays
//! asserted (`CTL1.SS` clear) from the opcode until the last burst, so one
//! command can span several starts. Page program uses the DMA write mode,
//! which sends opcode, address and data from SRAM in one go.

use crate::error::{Error, Result};
use crate::hal::HardwareAccess;
use crate::mailbox::Port;
use crate::regs::*;
use crate::spi::{AddressWidth, SpiCommand};

use super::{page_program_opcode, CommandEngine, EngineFeatures, EngineKind};

/// Words per normal-mode burst
const MAX_BURST: usize = 4;

/// SPIM controller
pub struct Spim<H> {
    hw: H,
}

/// CTL0 for a normal-mode burst of `len` bytes
fn normal_ctl0(output: bool, len: usize) -> u32 {
    (SPIM_OPMODE_NORMAL << SPIM_CTL0_OPMODE_SHIFT)
        | if output { SPIM_CTL0_QDIODIR } else { 0 }
        | (7 << SPIM_CTL0_DWIDTH_SHIFT)
        | (((len as u32) - 1) << SPIM_CTL0_BURSTNUM_SHIFT)
        | SPIM_CTL0_CIPHOFF
}

impl<H: HardwareAccess> Spim<H> {
    /// Wrap a bus
    pub fn new(hw: H) -> Self {
        Self { hw }
    }

    /// Release the bus
    pub fn into_inner(self) -> H {
        self.hw
    }

    fn go(&mut self) {
        self.hw.set_bits32(SPIM_BASE + SPIM_CTL1, SPIM_CTL1_SPIMEN);
        while self.hw.read32(SPIM_BASE + SPIM_CTL1) & SPIM_CTL1_SPIMEN != 0 {}
    }

    fn transmit(&mut self, bytes: &[u8]) {
        for burst in bytes.chunks(MAX_BURST) {
            self.hw.write32(SPIM_BASE + SPIM_CTL0, normal_ctl0(true, burst.len()));
            // The highest used word goes out first
            for (i, &b) in burst.iter().enumerate() {
                let word = (burst.len() - 1 - i) as u32;
                self.hw.write32(SPIM_BASE + SPIM_TX0 + 4 * word, u32::from(b));
            }
            self.go();
        }
    }

    fn receive(&mut self, buf: &mut [u8]) {
        for burst in buf.chunks_mut(MAX_BURST) {
            let len = burst.len();
            self.hw.write32(SPIM_BASE + SPIM_CTL0, normal_ctl0(false, len));
            self.go();
            for (i, b) in burst.iter_mut().enumerate() {
                let word = (len - 1 - i) as u32;
                *b = self.hw.read32(SPIM_BASE + SPIM_RX0 + 4 * word) as u8;
            }
        }
    }
}

impl<H: HardwareAccess> CommandEngine for Spim<H> {
    type Bus = H;

    fn bus(&mut self) -> &mut H {
        &mut self.hw
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Spim
    }

    fn supports_port(&self, port: Port) -> bool {
        port == Port::Internal
    }

    fn features(&self, _port: Port) -> EngineFeatures {
        EngineFeatures::empty()
    }

    fn start(&mut self) {
        let ctl1 = self.hw.read32(SPIM_BASE + SPIM_CTL1) & !SPIM_CTL1_DIVIDER_MASK;
        self.hw.write32(
            SPIM_BASE + SPIM_CTL1,
            ctl1 | (SPIM_DIVIDER_DEFAULT << SPIM_CTL1_DIVIDER_SHIFT),
        );
    }

    fn open_port(&mut self, _port: Port, _quad: bool) {}

    fn execute(&mut self, port: Port, cmd: &mut SpiCommand<'_>) -> Result<()> {
        if !self.supports_port(port) {
            return Err(Error::UnsupportedPort(port.code()));
        }
        let saved = self.hw.read32(SPIM_BASE + SPIM_CTL0);

        self.hw.write32(SPIM_BASE + SPIM_CTL0, normal_ctl0(true, 1));
        self.hw.write32(SPIM_BASE + SPIM_TX0, u32::from(cmd.opcode));
        self.hw.clear_bits32(SPIM_BASE + SPIM_CTL1, SPIM_CTL1_SS);
        self.go();

        let mut addr_buf = [0u8; 4];
        let address = cmd.encode_address(&mut addr_buf);
        self.transmit(address);
        self.transmit(cmd.write_data);
        self.receive(cmd.read_buf);

        self.hw.write32(SPIM_BASE + SPIM_CTL0, saved);
        self.hw.set_bits32(SPIM_BASE + SPIM_CTL1, SPIM_CTL1_SS | SPIM_CTL1_CDINVAL);
        Ok(())
    }

    fn program_page(&mut self, port: Port, addr: u32, data: &[u8], width: AddressWidth) -> Result<()> {
        if !self.supports_port(port) {
            return Err(Error::UnsupportedPort(port.code()));
        }
        if data.len() > SPIM_DMA_MAX {
            return Err(Error::TransferTooLong);
        }
        let saved = self.hw.read32(SPIM_BASE + SPIM_CTL0);
        let ctl0 = (u32::from(page_program_opcode(width)) << SPIM_CTL0_CMDCODE_SHIFT)
            | (SPIM_OPMODE_DMA_WRITE << SPIM_CTL0_OPMODE_SHIFT)
            | SPIM_CTL0_CIPHOFF
            | SPIM_CTL0_DMA_PP;
        self.hw.write32(SPIM_BASE + SPIM_CTL0, ctl0);

        let src = self.hw.dma_source(data);
        self.hw.write32(SPIM_BASE + SPIM_SRAMADDR, src);
        self.hw.write32(SPIM_BASE + SPIM_DMACNT, data.len() as u32);
        self.hw.write32(SPIM_BASE + SPIM_FADDR, addr);
        self.go();

        self.hw.write32(SPIM_BASE + SPIM_CTL0, saved);
        Ok(())
    }

    fn after_write(&mut self) {
        self.hw.set_bits32(SPIM_BASE + SPIM_CTL1, SPIM_CTL1_CDINVAL);
    }

    fn program_timeout_ms(&self) -> u32 {
        0
    }

    fn erase_timeout_ms(&self) -> u32 {
        0
    }
}
