//! Command-level flash model shared by the driver and dispatcher tests

use std::vec;
use std::vec::Vec;

use crate::engine::{CommandEngine, EngineFeatures, EngineKind};
use crate::error::Result;
use crate::hal::{Clock, HardwareAccess};
use crate::mailbox::Port;
use crate::spi::{opcodes, SpiCommand};

/// Bus with a virtual clock and no registers
#[derive(Default)]
pub(crate) struct TestBus {
    pub now: u64,
}

impl Clock for TestBus {
    fn now_us(&mut self) -> u64 {
        self.now
    }

    fn delay_us(&mut self, us: u32) {
        self.now += u64::from(us);
    }
}

impl HardwareAccess for TestBus {
    fn read8(&mut self, _addr: u32) -> u8 {
        0
    }
    fn read16(&mut self, _addr: u32) -> u16 {
        0
    }
    fn read32(&mut self, _addr: u32) -> u32 {
        0
    }
    fn write8(&mut self, _addr: u32, _value: u8) {}
    fn write16(&mut self, _addr: u32, _value: u16) {}
    fn write32(&mut self, _addr: u32, _value: u32) {}
    fn read_block(&mut self, _src: u32, buf: &mut [u8]) {
        buf.fill(0);
    }
    fn write_block(&mut self, _dst: u32, _data: &[u8]) {}
    fn dma_source(&mut self, _data: &[u8]) -> u32 {
        0
    }
}

/// SPI-NOR chip answering whole commands
pub(crate) struct FakeEngine {
    pub bus: TestBus,
    pub mem: Vec<u8>,
    pub id: [u8; 3],
    pub sfdp: Vec<u8>,
    pub sr1: u8,
    pub sr2: u8,
    /// WIP reads reported after each program or erase
    pub busy_polls: u32,
    pub stuck_busy: bool,
    pub features: EngineFeatures,
    pub ports: Vec<Port>,
    pub opcodes: Vec<u8>,
    pub writes: Vec<Vec<u8>>,
    pub opened: Vec<Port>,
    pub latch: Option<bool>,
    pub four_byte: bool,
    wel: bool,
    pending: u32,
}

impl FakeEngine {
    pub fn new(size: usize) -> Self {
        Self {
            bus: TestBus::default(),
            mem: vec![0xFF; size],
            id: [0xEF, 0x40, 0x14],
            sfdp: sfdp_table(size as u32, false),
            sr1: 0,
            sr2: 0,
            busy_polls: 2,
            stuck_busy: false,
            features: EngineFeatures::all(),
            ports: vec![Port::Pvt, Port::Shd, Port::Bkp],
            opcodes: Vec::new(),
            writes: Vec::new(),
            opened: Vec::new(),
            latch: None,
            four_byte: false,
            wel: false,
            pending: 0,
        }
    }

    pub fn count(&self, opcode: u8) -> usize {
        self.opcodes.iter().filter(|&&op| op == opcode).count()
    }

    fn start_busy(&mut self) {
        self.pending = self.busy_polls;
        self.wel = false;
    }
}

/// SFDP area with one BFPT at 0x30
pub(crate) fn sfdp_table(size: u32, four_byte: bool) -> Vec<u8> {
    let mut t = vec![0xFF; 0x40];
    t[..4].copy_from_slice(b"SFDP");
    t[4] = 6;
    t[5] = 1;
    t[6] = 0;
    t[8] = 0;
    t[9] = 6;
    t[10] = 1;
    t[11] = 9;
    t[12..15].copy_from_slice(&[0x30, 0, 0]);
    let mut dword1: u32 = 0xFFF1_20E5 & !(0b11 << 17);
    if four_byte {
        dword1 |= 1 << 17;
    }
    t[0x30..0x34].copy_from_slice(&dword1.to_le_bytes());
    t[0x34..0x38].copy_from_slice(&(size * 8 - 1).to_le_bytes());
    t
}

impl CommandEngine for FakeEngine {
    type Bus = TestBus;

    fn bus(&mut self) -> &mut TestBus {
        &mut self.bus
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Fiu
    }

    fn supports_port(&self, port: Port) -> bool {
        self.ports.contains(&port)
    }

    fn features(&self, _port: Port) -> EngineFeatures {
        self.features
    }

    fn open_port(&mut self, port: Port, _quad: bool) {
        self.opened.push(port);
    }

    fn execute(&mut self, _port: Port, cmd: &mut SpiCommand<'_>) -> Result<()> {
        self.opcodes.push(cmd.opcode);
        let addr = cmd.address.unwrap_or(0) as usize;
        match cmd.opcode {
            opcodes::RDID => cmd.read_buf.copy_from_slice(&self.id[..cmd.read_buf.len()]),
            opcodes::RDSR => {
                let busy = self.stuck_busy || self.pending > 0;
                self.pending = self.pending.saturating_sub(1);
                let mut sr = self.sr1;
                if busy {
                    sr |= opcodes::SR1_WIP;
                }
                cmd.read_buf[0] = sr;
            }
            opcodes::RDSR2 => cmd.read_buf[0] = self.sr2,
            opcodes::WREN => self.wel = true,
            opcodes::WRSR => {
                self.writes.push(cmd.write_data.to_vec());
                if self.wel {
                    self.sr1 = cmd.write_data[0];
                    if let Some(&sr2) = cmd.write_data.get(1) {
                        self.sr2 = sr2;
                    }
                }
                self.start_busy();
            }
            opcodes::RDSFDP => {
                let off = addr >> 8;
                for (i, b) in cmd.read_buf.iter_mut().enumerate() {
                    *b = self.sfdp.get(off + i).copied().unwrap_or(0xFF);
                }
            }
            opcodes::READ | opcodes::READ_4B => {
                let end = addr + cmd.read_buf.len();
                cmd.read_buf.copy_from_slice(&self.mem[addr..end]);
            }
            opcodes::PP | opcodes::PP_4B => {
                self.writes.push(cmd.write_data.to_vec());
                if self.wel {
                    for (i, &b) in cmd.write_data.iter().enumerate() {
                        self.mem[addr + i] &= b;
                    }
                }
                self.start_busy();
            }
            opcodes::SE_20 | opcodes::SE_21 => {
                if self.wel {
                    let start = addr & !(opcodes::SECTOR_SIZE as usize - 1);
                    self.mem[start..start + opcodes::SECTOR_SIZE as usize].fill(0xFF);
                }
                self.start_busy();
            }
            opcodes::EN4B => self.four_byte = true,
            opcodes::EX4B => self.four_byte = false,
            _ => {}
        }
        Ok(())
    }

    fn read_mapped(&mut self, _port: Port, addr: u32, buf: &mut [u8], use_4byte: bool) -> Result<()> {
        self.latch = Some(use_4byte);
        let addr = addr as usize;
        buf.copy_from_slice(&self.mem[addr..addr + buf.len()]);
        Ok(())
    }

    fn set_address_latch(&mut self, _port: Port, enable: bool) {
        self.latch = Some(enable);
    }

    fn program_timeout_ms(&self) -> u32 {
        10
    }
}
