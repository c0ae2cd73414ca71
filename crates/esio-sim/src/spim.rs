//! SPIM register model
//!
//! Normal mode clocks one to four words per start while `CTL1.SS` is held
//! low; DMA write mode frames a whole page program from SRAM on its own.

use esio_core::mailbox::Port;
use esio_core::regs::*;
use esio_core::spi::opcodes;

use crate::bus::{Flashes, StagingSram};

/// SPIM block in front of the on-die flash
#[derive(Debug, Clone)]
pub struct SpimModel {
    ctl0: u32,
    ctl1: u32,
    tx: [u32; 4],
    rx: [u32; 4],
    sram_addr: u32,
    dma_count: u32,
    flash_addr: u32,
    invalidations: usize,
}

impl Default for SpimModel {
    fn default() -> Self {
        Self {
            ctl0: 0,
            ctl1: SPIM_CTL1_SS,
            tx: [0; 4],
            rx: [0; 4],
            sram_addr: 0,
            dma_count: 0,
            flash_addr: 0,
            invalidations: 0,
        }
    }
}

impl SpimModel {
    /// Times the read cache was invalidated
    pub fn cache_invalidations(&self) -> usize {
        self.invalidations
    }

    /// Clock divider currently programmed
    pub fn divider(&self) -> u32 {
        (self.ctl1 & SPIM_CTL1_DIVIDER_MASK) >> SPIM_CTL1_DIVIDER_SHIFT
    }

    /// Word read at offset `off` from the SPIM base
    pub fn read32(&self, off: u32) -> u32 {
        match off {
            SPIM_CTL0 => self.ctl0,
            SPIM_CTL1 => self.ctl1,
            o if (SPIM_RX0..SPIM_RX0 + 16).contains(&o) => self.rx[((o - SPIM_RX0) / 4) as usize],
            o if (SPIM_TX0..SPIM_TX0 + 16).contains(&o) => self.tx[((o - SPIM_TX0) / 4) as usize],
            SPIM_SRAMADDR => self.sram_addr,
            SPIM_DMACNT => self.dma_count,
            SPIM_FADDR => self.flash_addr,
            _ => 0,
        }
    }

    /// Word write at offset `off`; `sram` backs DMA source addresses
    pub fn write32(&mut self, off: u32, value: u32, flashes: &mut Flashes, sram: &StagingSram) {
        match off {
            SPIM_CTL0 => self.ctl0 = value,
            SPIM_CTL1 => self.write_ctl1(value, flashes, sram),
            o if (SPIM_TX0..SPIM_TX0 + 16).contains(&o) => self.tx[((o - SPIM_TX0) / 4) as usize] = value,
            SPIM_SRAMADDR => self.sram_addr = value,
            SPIM_DMACNT => self.dma_count = value,
            SPIM_FADDR => self.flash_addr = value,
            _ => {}
        }
    }

    fn write_ctl1(&mut self, value: u32, flashes: &mut Flashes, sram: &StagingSram) {
        let was_selected = self.ctl1 & SPIM_CTL1_SS == 0;
        let selected = value & SPIM_CTL1_SS == 0;
        if !was_selected && selected {
            flashes.select(Port::Internal);
        } else if was_selected && !selected {
            flashes.deselect(Port::Internal);
        }
        if value & SPIM_CTL1_CDINVAL != 0 {
            self.invalidations += 1;
        }
        self.ctl1 = value & !(SPIM_CTL1_CDINVAL | SPIM_CTL1_SPIMEN);
        if value & SPIM_CTL1_SPIMEN != 0 {
            self.start(selected, flashes, sram);
        }
    }

    fn start(&mut self, selected: bool, flashes: &mut Flashes, sram: &StagingSram) {
        let opmode = (self.ctl0 & SPIM_CTL0_OPMODE_MASK) >> SPIM_CTL0_OPMODE_SHIFT;
        if opmode == SPIM_OPMODE_DMA_WRITE {
            let opcode = (self.ctl0 >> SPIM_CTL0_CMDCODE_SHIFT) as u8;
            let addr = self.flash_addr.to_be_bytes();
            let addr = if opcode == opcodes::PP_4B { &addr[..] } else { &addr[1..] };
            let mut frame = vec![opcode];
            frame.extend_from_slice(addr);
            frame.extend_from_slice(sram.fetch(self.sram_addr, self.dma_count as usize));
            flashes.select(Port::Internal);
            flashes.write(Port::Internal, &frame);
            flashes.deselect(Port::Internal);
            return;
        }

        if !selected {
            return;
        }
        let len = (((self.ctl0 & SPIM_CTL0_BURSTNUM_MASK) >> SPIM_CTL0_BURSTNUM_SHIFT) + 1) as usize;
        if self.ctl0 & SPIM_CTL0_QDIODIR != 0 {
            // Highest word first
            let bytes: Vec<u8> = (0..len).map(|i| self.tx[len - 1 - i] as u8).collect();
            flashes.write(Port::Internal, &bytes);
        } else {
            let mut bytes = [0u8; 4];
            flashes.read(Port::Internal, &mut bytes[..len]);
            for (i, &b) in bytes[..len].iter().enumerate() {
                self.rx[len - 1 - i] = u32::from(b);
            }
        }
    }
}
