//! FIU register model
//!
//! Models the UMA path of both FIU generations closely enough for the
//! engines to run unmodified: chip select (automatic or software), the
//! opcode/address/data phases of one UMA transaction, the extended data
//! buffer and the 4-byte decode latch used by the mapped windows.

use esio_core::mailbox::Port;
use esio_core::regs::*;

use crate::bus::Flashes;

const REG_SPACE: usize = 0x60;

/// FIU block of one eSIO
#[derive(Debug, Clone)]
pub struct FiuModel {
    legacy: bool,
    regs: [u8; REG_SPACE],
    asserted: Option<Port>,
    transactions: usize,
}

impl FiuModel {
    /// FIU in its reset state; `legacy` selects the NCT6692D behaviour
    pub fn new(legacy: bool) -> Self {
        let mut regs = [0u8; REG_SPACE];
        regs[FIU_UMA_ECTS as usize] = UmaEcts::ALL_CS_RELEASED.bits();
        Self {
            legacy,
            regs,
            asserted: None,
            transactions: 0,
        }
    }

    /// Whether this is the NCT6692D generation
    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    /// UMA transactions executed so far
    pub fn transactions(&self) -> usize {
        self.transactions
    }

    /// Whether mapped reads decode four address bytes
    pub fn four_byte_decode(&self) -> bool {
        self.regs[FIU_EXT_CFG as usize] & EXT_CFG_FOUR_BADDR != 0
    }

    // AB0..AB2 alias the low bytes of AB0_3, DB0_3 aliases DB0..DB3
    fn slot(off: u32) -> usize {
        match off {
            FIU_UMA_AB0..=FIU_UMA_AB2 => (FIU_UMA_AB0_3 + (off - FIU_UMA_AB0)) as usize,
            o if (FIU_UMA_DB0_3..FIU_UMA_DB0_3 + 4).contains(&o) => (FIU_UMA_DB0 + (o - FIU_UMA_DB0_3)) as usize,
            o => o as usize,
        }
    }

    /// Byte read at offset `off` from the FIU base
    pub fn read8(&self, off: u32) -> u8 {
        self.regs[Self::slot(off)]
    }

    /// Byte write at offset `off`; CTS and ECTS writes act on the bus
    pub fn write8(&mut self, off: u32, value: u8, flashes: &mut Flashes) {
        match off {
            FIU_UMA_CTS => {
                let cts = UmaCts::from_bits_retain(value);
                if cts.contains(UmaCts::EXEC_DONE) {
                    self.execute(cts, flashes);
                }
                self.regs[off as usize] = (cts - UmaCts::EXEC_DONE).bits();
            }
            FIU_UMA_ECTS => {
                self.regs[off as usize] = value;
                let asserted = self.manual_device(UmaEcts::from_bits_retain(value));
                if asserted != self.asserted {
                    if let Some(old) = self.asserted {
                        flashes.deselect(old);
                    }
                    if let Some(new) = asserted {
                        flashes.select(new);
                    }
                    self.asserted = asserted;
                }
            }
            _ => self.regs[Self::slot(off)] = value,
        }
    }

    fn manual_device(&self, ects: UmaEcts) -> Option<Port> {
        if !ects.contains(UmaEcts::SW_CS0) {
            Some(Port::Pvt)
        } else if !ects.contains(UmaEcts::SW_CS1) {
            Some(Port::Shd)
        } else if !self.legacy && !ects.contains(UmaEcts::SW_CS2) {
            Some(Port::Bkp)
        } else {
            None
        }
    }

    fn auto_device(&self, cts: UmaCts, ects: UmaEcts) -> Port {
        match (cts.contains(UmaCts::DEV_NUM), ects.contains(UmaEcts::DEV_NUM_BKP)) {
            (false, _) => Port::Pvt,
            (true, true) if !self.legacy => Port::Bkp,
            (true, _) => Port::Shd,
        }
    }

    fn address_bytes(&self, cts: UmaCts, ects: UmaEcts) -> usize {
        if self.legacy {
            match (cts.contains(UmaCts::A_SIZE), self.four_byte_decode()) {
                (false, _) => 0,
                (true, false) => 3,
                (true, true) => 4,
            }
        } else {
            ects.addr_size() as usize
        }
    }

    fn execute(&mut self, cts: UmaCts, flashes: &mut Flashes) {
        self.transactions += 1;
        let ects = UmaEcts::from_bits_retain(self.regs[FIU_UMA_ECTS as usize]);
        let (port, auto) = match self.asserted {
            Some(port) => (port, false),
            None => (self.auto_device(cts, ects), true),
        };
        if auto {
            flashes.select(port);
        }

        let mut out = Vec::with_capacity(1 + 4 + FIU_EXT_DB_SIZE);
        if !cts.contains(UmaCts::C_SIZE) {
            out.push(self.regs[FIU_UMA_CODE as usize]);
        }
        let ab_at = FIU_UMA_AB0_3 as usize;
        let ab = u32::from_le_bytes([
            self.regs[ab_at],
            self.regs[ab_at + 1],
            self.regs[ab_at + 2],
            self.regs[ab_at + 3],
        ]);
        for i in (0..self.address_bytes(cts, ects)).rev() {
            out.push((ab >> (8 * i)) as u8);
        }

        let db = FIU_UMA_DB0 as usize;
        let ext_cfg = self.regs[FIU_EXT_DB_CFG as usize];
        if cts.contains(UmaCts::RD_WR) {
            if !self.legacy && ext_cfg & EXT_DB_CFG_EN != 0 {
                let n = (ext_cfg & EXT_DB_CFG_D_SIZE_MASK) as usize;
                let ext = FIU_UMA_EXT_DB as usize;
                out.extend_from_slice(&self.regs[ext..ext + n.min(FIU_EXT_DB_SIZE)]);
            } else {
                out.extend_from_slice(&self.regs[db..db + cts.data_size().min(4)]);
            }
            flashes.write(port, &out);
        } else {
            flashes.write(port, &out);
            let n = cts.data_size().min(4);
            let mut buf = [0u8; 4];
            flashes.read(port, &mut buf[..n]);
            self.regs[db..db + n].copy_from_slice(&buf[..n]);
        }

        if auto {
            flashes.deselect(port);
        }
    }
}
