//! Simulated target bus
//!
//! [`SimBus`] is the [`HardwareAccess`] binding the resident engines run
//! against in the simulator. It routes register accesses to the FIU and
//! SPIM models, resolves the memory-mapped flash windows, stages DMA sources
//! in a small SRAM and keeps a virtual microsecond clock that only advances
//! when the code under test delays.

use std::collections::BTreeMap;

use esio_core::hal::{Clock, HardwareAccess};
use esio_core::mailbox::Port;
use esio_core::regs::*;

use crate::fiu::FiuModel;
use crate::spi_nor::SpiNor;
use crate::spim::SpimModel;

/// Where DMA sources are staged
pub const STAGING_SRAM_BASE: u32 = 0x2000_0000;
/// Size of the staging SRAM
pub const STAGING_SRAM_SIZE: usize = 0x1000;

const FIU_SPAN: u32 = 0x60;
const SPIM_SPAN: u32 = 0x40;
const LEGACY_WINDOW_SIZE: u32 = 0x0400_0000;

fn slot(port: Port) -> usize {
    match port {
        Port::Pvt => 0,
        Port::Shd => 1,
        Port::Bkp => 2,
        Port::Internal => 3,
    }
}

const PORTS: [Port; 4] = [Port::Pvt, Port::Shd, Port::Bkp, Port::Internal];

/// The flash parts wired to each chip select
///
/// A port without a part behaves like a floating bus and reads 0xFF.
#[derive(Debug, Clone, Default)]
pub struct Flashes {
    parts: [Option<SpiNor>; 4],
}

impl Flashes {
    /// Wire `flash` to `port`
    pub fn attach(&mut self, port: Port, flash: SpiNor) {
        self.parts[slot(port)] = Some(flash);
    }

    /// The part on `port`
    pub fn get(&self, port: Port) -> Option<&SpiNor> {
        self.parts[slot(port)].as_ref()
    }

    /// The part on `port`, mutably
    pub fn get_mut(&mut self, port: Port) -> Option<&mut SpiNor> {
        self.parts[slot(port)].as_mut()
    }

    /// Assert chip select on `port`
    pub fn select(&mut self, port: Port) {
        if let Some(flash) = self.get_mut(port) {
            flash.select();
        }
    }

    /// Release chip select on `port`
    pub fn deselect(&mut self, port: Port) {
        if let Some(flash) = self.get_mut(port) {
            flash.deselect();
        }
    }

    /// Clock bytes out to `port`
    pub fn write(&mut self, port: Port, bytes: &[u8]) {
        if let Some(flash) = self.get_mut(port) {
            flash.write(bytes);
        }
    }

    /// Clock bytes in from `port`
    pub fn read(&mut self, port: Port, buf: &mut [u8]) {
        match self.get_mut(port) {
            Some(flash) => flash.read(buf),
            None => buf.fill(0xFF),
        }
    }

    /// Opcodes every part saw since the last call, tagged by port
    pub fn take_log(&mut self) -> Vec<(Port, u8)> {
        let mut log = Vec::new();
        for port in PORTS {
            if let Some(flash) = self.get_mut(port) {
                log.extend(flash.take_log().into_iter().map(|op| (port, op)));
            }
        }
        log
    }
}

/// SRAM that DMA sources are copied into
#[derive(Debug, Clone)]
pub struct StagingSram {
    bytes: Vec<u8>,
}

impl Default for StagingSram {
    fn default() -> Self {
        Self {
            bytes: vec![0; STAGING_SRAM_SIZE],
        }
    }
}

impl StagingSram {
    fn offset(addr: u32) -> Option<usize> {
        addr.checked_sub(STAGING_SRAM_BASE)
            .map(|off| off as usize)
            .filter(|&off| off < STAGING_SRAM_SIZE)
    }

    /// Bytes at `addr`, clipped to the SRAM
    pub fn fetch(&self, addr: u32, len: usize) -> &[u8] {
        match Self::offset(addr) {
            Some(off) => &self.bytes[off..(off + len).min(STAGING_SRAM_SIZE)],
            None => &[],
        }
    }

    fn stage(&mut self, data: &[u8]) -> u32 {
        let n = data.len().min(STAGING_SRAM_SIZE);
        self.bytes[..n].copy_from_slice(&data[..n]);
        STAGING_SRAM_BASE
    }
}

/// Bus of one simulated eSIO
#[derive(Debug, Clone, Default)]
pub struct SimBus {
    fiu: Option<FiuModel>,
    spim: SpimModel,
    flashes: Flashes,
    sram: StagingSram,
    misc: BTreeMap<u32, u8>,
    now_us: u64,
}

impl SimBus {
    /// Bus with an FIU of the given generation and no flash attached
    pub fn new(legacy_fiu: bool) -> Self {
        Self {
            fiu: Some(FiuModel::new(legacy_fiu)),
            ..Self::default()
        }
    }

    /// Wire `flash` to `port`
    pub fn attach(&mut self, port: Port, flash: SpiNor) {
        self.flashes.attach(port, flash);
    }

    /// The flash parts
    pub fn flashes(&self) -> &Flashes {
        &self.flashes
    }

    /// The flash parts, mutably
    pub fn flashes_mut(&mut self) -> &mut Flashes {
        &mut self.flashes
    }

    /// The FIU model
    pub fn fiu(&self) -> Option<&FiuModel> {
        self.fiu.as_ref()
    }

    /// The SPIM model
    pub fn spim(&self) -> &SpimModel {
        &self.spim
    }

    /// Virtual time in microseconds
    pub fn elapsed_us(&self) -> u64 {
        self.now_us
    }

    /// Flash port and offset behind a memory-mapped address
    pub fn window(&self, addr: u32) -> Option<(Port, u32)> {
        if addr >= SPIM_FLASH_BASE {
            if let Some(flash) = self.flashes.get(Port::Internal) {
                let off = addr - SPIM_FLASH_BASE;
                if off < flash.config().size {
                    return Some((Port::Internal, off));
                }
            }
        }
        let fiu = self.fiu.as_ref()?;
        let (port, off) = if fiu.is_legacy() {
            match addr.checked_sub(FIU_WINDOW_BASE)? {
                off if off < LEGACY_WINDOW_SIZE => (Port::Pvt, off),
                off if off < 2 * LEGACY_WINDOW_SIZE => (Port::Shd, off - LEGACY_WINDOW_SIZE),
                _ => return None,
            }
        } else {
            let rel = addr.checked_sub(FIU_WINDOW_BASE)?;
            let port = match rel / FIU_WINDOW_STRIDE {
                0 => Port::Pvt,
                1 => Port::Shd,
                2 => Port::Bkp,
                _ => return None,
            };
            (port, rel % FIU_WINDOW_STRIDE)
        };
        // Without the latch the window only decodes 24 address bits
        let off = if fiu.four_byte_decode() { off } else { off & 0x00FF_FFFF };
        Some((port, off))
    }

    /// Read a memory-mapped flash window; false when `addr` is not mapped
    pub fn read_window(&self, addr: u32, buf: &mut [u8]) -> bool {
        let Some((port, off)) = self.window(addr) else {
            return false;
        };
        match self.flashes.get(port) {
            Some(flash) => flash.read_array(off, buf),
            None => buf.fill(0xFF),
        }
        true
    }

    fn fiu_offset(&self, addr: u32) -> Option<u32> {
        self.fiu.as_ref()?;
        addr.checked_sub(FIU_BASE).filter(|&off| off < FIU_SPAN)
    }

    fn spim_offset(addr: u32) -> Option<u32> {
        addr.checked_sub(SPIM_BASE).filter(|&off| off < SPIM_SPAN)
    }
}

impl Clock for SimBus {
    fn now_us(&mut self) -> u64 {
        self.now_us
    }

    fn delay_us(&mut self, us: u32) {
        self.now_us += u64::from(us);
    }
}

impl HardwareAccess for SimBus {
    fn read8(&mut self, addr: u32) -> u8 {
        if let (Some(off), Some(fiu)) = (self.fiu_offset(addr), self.fiu.as_ref()) {
            return fiu.read8(off);
        }
        if let Some(off) = Self::spim_offset(addr) {
            let word = self.spim.read32(off & !3);
            return (word >> (8 * (off & 3))) as u8;
        }
        self.misc.get(&addr).copied().unwrap_or(0)
    }

    fn read16(&mut self, addr: u32) -> u16 {
        u16::from_le_bytes([self.read8(addr), self.read8(addr + 1)])
    }

    fn read32(&mut self, addr: u32) -> u32 {
        if let Some(off) = Self::spim_offset(addr) {
            return self.spim.read32(off);
        }
        u32::from_le_bytes([
            self.read8(addr),
            self.read8(addr + 1),
            self.read8(addr + 2),
            self.read8(addr + 3),
        ])
    }

    fn write8(&mut self, addr: u32, value: u8) {
        if let Some(off) = self.fiu_offset(addr) {
            if let Some(fiu) = self.fiu.as_mut() {
                fiu.write8(off, value, &mut self.flashes);
            }
            return;
        }
        self.misc.insert(addr, value);
    }

    fn write16(&mut self, addr: u32, value: u16) {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.write8(addr + i as u32, b);
        }
    }

    fn write32(&mut self, addr: u32, value: u32) {
        if let Some(off) = Self::spim_offset(addr) {
            self.spim.write32(off, value, &mut self.flashes, &self.sram);
            return;
        }
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.write8(addr + i as u32, b);
        }
    }

    fn read_block(&mut self, src: u32, buf: &mut [u8]) {
        if self.read_window(src, buf) {
            return;
        }
        if StagingSram::offset(src).is_some() {
            let data = self.sram.fetch(src, buf.len());
            buf[..data.len()].copy_from_slice(data);
            return;
        }
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.read8(src + i as u32);
        }
    }

    fn write_block(&mut self, dst: u32, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            self.write8(dst + i as u32, b);
        }
    }

    fn dma_source(&mut self, data: &[u8]) -> u32 {
        self.sram.stage(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi_nor::SpiNorConfig;

    #[test]
    fn test_window_decode_per_generation() {
        let mut bus = SimBus::new(false);
        bus.attach(Port::Internal, SpiNor::new(SpiNorConfig::new(0xEF4015, 0x20_0000)));
        assert_eq!(bus.window(0x7000_1000), Some((Port::Shd, 0x1000)));
        assert_eq!(bus.window(0x8000_0010), Some((Port::Bkp, 0x10)));
        assert_eq!(bus.window(0x0008_0100), Some((Port::Internal, 0x100)));
        assert_eq!(bus.window(0x6100_0000), Some((Port::Pvt, 0)));
        assert_eq!(bus.window(0x9000_0000), None);

        let legacy = SimBus::new(true);
        assert_eq!(legacy.window(0x6400_0020), Some((Port::Shd, 0x20)));
        assert_eq!(legacy.window(0x6000_0020), Some((Port::Pvt, 0x20)));
        assert_eq!(legacy.window(0x0008_0000), None);
    }

    #[test]
    fn test_clock_advances_only_on_delay() {
        let mut bus = SimBus::new(false);
        assert_eq!(bus.now_us(), 0);
        bus.read8(FIU_BASE + FIU_UMA_CTS);
        assert_eq!(bus.now_us(), 0);
        bus.delay_us(50);
        assert_eq!(bus.now_us(), 50);
    }

    #[test]
    fn test_dma_source_stages_data() {
        let mut bus = SimBus::new(false);
        let addr = bus.dma_source(&[1, 2, 3]);
        let mut buf = [0u8; 3];
        bus.read_block(addr, &mut buf);
        assert_eq!(buf, [1, 2, 3]);
    }
}
