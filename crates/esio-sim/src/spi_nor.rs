//! Behavioural SPI-NOR flash model
//!
//! The model sees the bus the way a real part does: chip select goes low,
//! bytes are clocked in, bytes are clocked out, chip select goes high.
//! Reads are answered from the bytes received so far in the frame; writes,
//! erases and register updates take effect when chip select is released.

use esio_core::spi::opcodes;

/// Static description of a simulated flash part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiNorConfig {
    /// JEDEC id, `mfr << 16 | type << 8 | capacity`
    pub id: u32,
    /// Capacity in bytes
    pub size: u32,
    /// Answer RDSFDP with a basic parameter table
    pub sfdp: bool,
    /// Advertise 4-byte addressing in SFDP
    pub four_byte: bool,
    /// Status polls that report WIP after a program or erase
    pub busy_polls: u32,
    /// Erasing the sector at this address leaves WIP set forever
    pub stuck_erase_at: Option<u32>,
}

impl SpiNorConfig {
    /// Part with SFDP, 4-byte addressing advertised above 16 MiB
    pub fn new(id: u32, size: u32) -> Self {
        Self {
            id,
            size,
            sfdp: true,
            four_byte: size > 0x100_0000,
            busy_polls: 2,
            stuck_erase_at: None,
        }
    }

    /// Same part without an SFDP table
    pub fn without_sfdp(mut self) -> Self {
        self.sfdp = false;
        self
    }

    /// Same part with a sector whose erase never completes
    pub fn with_stuck_erase(mut self, addr: u32) -> Self {
        self.stuck_erase_at = Some(addr);
        self
    }
}

const BFPT_OFFSET: usize = 0x30;

/// Minimal JESD216 image: header, one parameter header, two BFPT dwords
pub fn sfdp_table(size: u32, four_byte: bool) -> Vec<u8> {
    let mut t = vec![0xFF; BFPT_OFFSET + 9 * 4];
    t[..4].copy_from_slice(b"SFDP");
    t[4] = 6; // minor
    t[5] = 1; // major
    t[6] = 0; // one parameter header
    t[8] = 0x00; // BFPT id lsb
    t[9] = 6;
    t[10] = 1;
    t[11] = 9; // length in dwords
    t[12..15].copy_from_slice(&(BFPT_OFFSET as u32).to_le_bytes()[..3]);

    let mut dword1: u32 = 0xFFF1_20E5 & !(0b11 << 17);
    if four_byte {
        dword1 |= 1 << 17;
    }
    let dword2 = size * 8 - 1;
    t[BFPT_OFFSET..BFPT_OFFSET + 4].copy_from_slice(&dword1.to_le_bytes());
    t[BFPT_OFFSET + 4..BFPT_OFFSET + 8].copy_from_slice(&dword2.to_le_bytes());
    t
}

/// A flash part on one chip select
#[derive(Debug, Clone)]
pub struct SpiNor {
    config: SpiNorConfig,
    data: Vec<u8>,
    sfdp: Vec<u8>,
    sr1: u8,
    sr2: u8,
    write_enabled: bool,
    in_4byte_mode: bool,
    busy: u32,
    stuck: bool,
    selected: bool,
    frame: Vec<u8>,
    read_pos: usize,
    log: Vec<u8>,
}

impl SpiNor {
    /// Erased part
    pub fn new(config: SpiNorConfig) -> Self {
        let sfdp = if config.sfdp {
            sfdp_table(config.size, config.four_byte)
        } else {
            Vec::new()
        };
        Self {
            data: vec![0xFF; config.size as usize],
            sfdp,
            config,
            sr1: 0,
            sr2: 0,
            write_enabled: false,
            in_4byte_mode: false,
            busy: 0,
            stuck: false,
            selected: false,
            frame: Vec::new(),
            read_pos: 0,
            log: Vec::new(),
        }
    }

    /// Part description
    pub fn config(&self) -> &SpiNorConfig {
        &self.config
    }

    /// Array contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable array contents, for preloading
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Status registers as (SR1, SR2)
    pub fn status(&self) -> (u8, u8) {
        (self.sr1, self.sr2)
    }

    /// Whether EN4B is in effect
    pub fn in_4byte_mode(&self) -> bool {
        self.in_4byte_mode
    }

    /// Opcodes of completed frames since the last call
    pub fn take_log(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.log)
    }

    /// Direct array read, used by memory-mapped windows
    pub fn read_array(&self, offset: u32, buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self
                .data
                .get(offset as usize + i)
                .copied()
                .unwrap_or(0xFF);
        }
    }

    /// Chip select asserted
    pub fn select(&mut self) {
        self.selected = true;
        self.frame.clear();
        self.read_pos = 0;
    }

    /// Bytes clocked into the part
    pub fn write(&mut self, bytes: &[u8]) {
        if self.selected {
            self.frame.extend_from_slice(bytes);
        }
    }

    /// Bytes clocked out of the part
    pub fn read(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = if self.selected { self.next_out() } else { 0xFF };
        }
    }

    /// Chip select released; the frame's command takes effect
    pub fn deselect(&mut self) {
        if !self.selected {
            return;
        }
        self.selected = false;
        let frame = core::mem::take(&mut self.frame);
        if let Some(&opcode) = frame.first() {
            self.log.push(opcode);
            self.complete(opcode, &frame[1..]);
        }
    }

    fn addr_len(&self, opcode: u8) -> usize {
        match opcode {
            opcodes::READ_4B | opcodes::PP_4B | opcodes::SE_21 | opcodes::DIOR_4B => 4,
            _ if self.in_4byte_mode => 4,
            _ => 3,
        }
    }

    fn frame_address(&self, len: usize) -> Option<u32> {
        let bytes = self.frame.get(1..1 + len)?;
        Some(bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
    }

    fn status1(&self) -> u8 {
        let mut sr = self.sr1;
        if self.write_enabled {
            sr |= opcodes::SR1_WEL;
        }
        if self.stuck || self.busy > 0 {
            sr |= opcodes::SR1_WIP;
        }
        sr
    }

    fn next_out(&mut self) -> u8 {
        let Some(&opcode) = self.frame.first() else {
            return 0xFF;
        };
        let pos = self.read_pos;
        self.read_pos += 1;
        match opcode {
            opcodes::RDID => {
                let id = self.config.id.to_be_bytes();
                id.get(1 + pos).copied().unwrap_or(0xFF)
            }
            opcodes::RDSR => {
                let sr = self.status1();
                self.busy = self.busy.saturating_sub(1);
                sr
            }
            opcodes::RDSR2 => self.sr2,
            opcodes::RDSFDP => match self.frame_address(3) {
                Some(addr) => self.sfdp.get(addr as usize + pos).copied().unwrap_or(0xFF),
                None => 0xFF,
            },
            opcodes::READ | opcodes::READ_4B => {
                let len = self.addr_len(opcode);
                match self.frame_address(len) {
                    Some(addr) => self
                        .data
                        .get(addr as usize + pos)
                        .copied()
                        .unwrap_or(0xFF),
                    None => 0xFF,
                }
            }
            _ => 0xFF,
        }
    }

    fn complete(&mut self, opcode: u8, rest: &[u8]) {
        if self.busy > 0 || self.stuck {
            // Only status reads are accepted while busy
            return;
        }
        match opcode {
            opcodes::WREN => self.write_enabled = true,
            opcodes::WRDI => self.write_enabled = false,
            opcodes::EN4B => self.in_4byte_mode = true,
            opcodes::EX4B => self.in_4byte_mode = false,
            opcodes::WRSR if self.write_enabled => {
                if let Some(&sr1) = rest.first() {
                    self.sr1 = sr1 & !(opcodes::SR1_WIP | opcodes::SR1_WEL);
                }
                if let Some(&sr2) = rest.get(1) {
                    self.sr2 = sr2;
                }
                self.finish_write();
            }
            opcodes::PP | opcodes::PP_4B if self.write_enabled => {
                let len = self.addr_len(opcode);
                if rest.len() >= len {
                    let addr = rest[..len].iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
                    self.program(addr, &rest[len..]);
                }
                self.finish_write();
            }
            opcodes::SE_20 | opcodes::SE_21 if self.write_enabled => {
                let len = self.addr_len(opcode);
                if rest.len() >= len {
                    let addr = rest[..len].iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
                    self.erase(addr);
                }
                self.finish_write();
            }
            _ => {}
        }
    }

    fn finish_write(&mut self) {
        self.write_enabled = false;
        self.busy = self.config.busy_polls;
    }

    fn program(&mut self, addr: u32, data: &[u8]) {
        // Writes wrap inside the 256-byte page
        let page = addr & !(opcodes::PAGE_SIZE - 1);
        for (i, &byte) in data.iter().enumerate() {
            let offset = page + (addr + i as u32) % opcodes::PAGE_SIZE;
            if let Some(cell) = self.data.get_mut(offset as usize) {
                *cell &= byte;
            }
        }
    }

    fn erase(&mut self, addr: u32) {
        let start = (addr & !(opcodes::SECTOR_SIZE - 1)) as usize;
        if self.config.stuck_erase_at == Some(start as u32) {
            self.stuck = true;
            return;
        }
        let end = (start + opcodes::SECTOR_SIZE as usize).min(self.data.len());
        if start < end {
            self.data[start..end].fill(0xFF);
        }
    }
}
