//! Flash operations on top of a command engine
//!
//! [`FlashDriver`] turns single SPI transactions into the operations the
//! mailbox serves: identification, SFDP geometry discovery, sector erase,
//! page-chunked program, read, and the address/quad mode switches applied
//! before each request. Everything here is a blocking spin-poll.

use log::{debug, trace};

use crate::engine::{CommandEngine, EngineFeatures};
use crate::error::{Error, Result};
use crate::hal::{poll_until, Clock};
use crate::mailbox::{FlashInfoRecord, Port};
use crate::sfdp::{self, Geometry, BFPT_PROBE_LEN, SFDP_PROBE_LEN};
use crate::spi::{opcodes, quad_enable_bit, AddressWidth, QuadEnableBit, SpiCommand};

/// Status register poll interval
pub const WAIT_READY_POLL_US: u32 = 50;

/// Bytes fetched per command when reading without a mapped window
const COMMAND_READ_CHUNK: usize = 4;

/// What Init reports about the flash on a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashIdentity {
    /// JEDEC id, `mfr << 16 | type << 8 | capacity`
    pub id: u32,
    /// Capacity in bytes, 0 when only the id was read
    pub size: u32,
    /// Whether 4-byte addressing is available
    pub supports_4byte: bool,
}

impl FlashIdentity {
    /// Identity carrying only a JEDEC id
    pub fn id_only(id: u32) -> Self {
        Self {
            id,
            size: 0,
            supports_4byte: false,
        }
    }

    /// Mailbox encoding
    pub fn record(&self) -> FlashInfoRecord {
        FlashInfoRecord::new(self.id, self.size, self.supports_4byte)
    }
}

/// Splits a write into pieces that never cross a page boundary
///
/// The first piece runs up to the next boundary, the rest are full pages,
/// and the last may be short.
pub struct PageChunks<'a> {
    addr: u32,
    data: &'a [u8],
}

impl<'a> PageChunks<'a> {
    /// Chunks of `data` destined for flash address `addr`
    pub fn new(addr: u32, data: &'a [u8]) -> Self {
        Self { addr, data }
    }
}

impl<'a> Iterator for PageChunks<'a> {
    type Item = (u32, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        let room = (opcodes::PAGE_SIZE - self.addr % opcodes::PAGE_SIZE) as usize;
        let (chunk, rest) = self.data.split_at(room.min(self.data.len()));
        let addr = self.addr;
        self.addr = self.addr.wrapping_add(chunk.len() as u32);
        self.data = rest;
        Some((addr, chunk))
    }
}

/// Flash operations over one engine
pub struct FlashDriver<E> {
    engine: E,
}

impl<E: CommandEngine> FlashDriver<E> {
    /// Wrap an engine
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// The engine underneath
    pub fn engine(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Release the engine
    pub fn into_inner(self) -> E {
        self.engine
    }

    fn run(&mut self, port: Port, mut cmd: SpiCommand<'_>) -> Result<()> {
        self.engine.execute(port, &mut cmd)
    }

    /// Read the 3-byte JEDEC id as `mfr << 16 | type << 8 | capacity`
    pub fn identify(&mut self, port: Port) -> Result<u32> {
        let mut id = [0u8; 3];
        self.run(port, SpiCommand::read_reg(opcodes::RDID, &mut id))?;
        let id = u32::from(id[0]) << 16 | u32::from(id[1]) << 8 | u32::from(id[2]);
        debug!("{}: JEDEC id 0x{:06X}", port, id);
        Ok(id)
    }

    /// [`identify`](Self::identify), rejecting an absent or floating chip
    pub fn identify_checked(&mut self, port: Port) -> Result<u32> {
        match self.identify(port)? {
            0 | 0x00FF_FFFF => Err(Error::InvalidJedecId),
            id => Ok(id),
        }
    }

    fn read_sfdp(&mut self, port: Port, addr: u32, buf: &mut [u8]) -> Result<()> {
        // 24-bit address followed by one dummy byte
        self.run(
            port,
            SpiCommand::read(opcodes::RDSFDP, addr << 8, AddressWidth::FourByte, buf),
        )
    }

    /// JEDEC id plus capacity and addressing from SFDP
    pub fn discover_geometry(&mut self, port: Port) -> Result<FlashIdentity> {
        let id = self.identify(port)?;

        let mut probe = [0u8; SFDP_PROBE_LEN];
        self.read_sfdp(port, 0, &mut probe)?;
        let table = sfdp::parse_probe(&probe)?;

        let mut bfpt = [0u8; BFPT_PROBE_LEN];
        self.read_sfdp(port, table, &mut bfpt)?;
        let Geometry { size, supports_4byte } = sfdp::parse_bfpt(&bfpt)?;

        debug!(
            "{}: SFDP table at 0x{:06X}, {} bytes, 4-byte {}",
            port, table, size, supports_4byte
        );
        Ok(FlashIdentity {
            id,
            size,
            supports_4byte,
        })
    }

    /// Status register 1
    pub fn read_status(&mut self, port: Port) -> Result<u8> {
        let mut sr = [0u8; 1];
        self.run(port, SpiCommand::read_reg(opcodes::RDSR, &mut sr))?;
        Ok(sr[0])
    }

    /// Status register 2
    pub fn read_status2(&mut self, port: Port) -> Result<u8> {
        let mut sr = [0u8; 1];
        self.run(port, SpiCommand::read_reg(opcodes::RDSR2, &mut sr))?;
        Ok(sr[0])
    }

    /// Send WREN
    pub fn write_enable(&mut self, port: Port) -> Result<()> {
        self.run(port, SpiCommand::simple(opcodes::WREN))
    }

    /// Poll WIP until clear
    ///
    /// Fails with [`Error::Timeout`] once `timeout_ms` has elapsed; 0 waits
    /// forever.
    pub fn wait_ready(&mut self, port: Port, timeout_ms: u32) -> Result<()> {
        let mut failure = None;
        let ready = poll_until(self, WAIT_READY_POLL_US, timeout_ms, |drv| {
            match drv.read_status(port) {
                Ok(sr) => sr & opcodes::SR1_WIP == 0,
                Err(e) => {
                    failure = Some(e);
                    true
                }
            }
        });
        match failure {
            Some(e) => Err(e),
            None if ready => Ok(()),
            None => {
                debug!("{}: WIP still set after {} ms", port, timeout_ms);
                Err(Error::Timeout)
            }
        }
    }

    /// Erase the 4 KiB sector containing `addr`
    pub fn erase_sector(&mut self, port: Port, addr: u32, use_4byte: bool) -> Result<()> {
        let (opcode, width) = if use_4byte {
            (opcodes::SE_21, AddressWidth::FourByte)
        } else {
            (opcodes::SE_20, AddressWidth::ThreeByte)
        };
        trace!("{}: erase sector 0x{:08X}", port, addr);
        self.write_enable(port)?;
        self.run(port, SpiCommand::erase(opcode, addr, width))?;
        let result = self.wait_ready(port, self.engine.erase_timeout_ms());
        self.engine.after_write();
        result
    }

    /// Program `data` at `addr`, one page-bounded chunk at a time
    pub fn program_range(&mut self, port: Port, addr: u32, data: &[u8], use_4byte: bool) -> Result<()> {
        let width = AddressWidth::for_mode(use_4byte);
        let timeout = self.engine.program_timeout_ms();
        for (chunk_addr, chunk) in PageChunks::new(addr, data) {
            self.write_enable(port)?;
            self.engine.program_page(port, chunk_addr, chunk, width)?;
            let result = self.wait_ready(port, timeout);
            self.engine.after_write();
            result?;
        }
        Ok(())
    }

    /// Read `buf.len()` bytes starting at `addr`
    ///
    /// Uses the memory-mapped window where the port has one, otherwise
    /// READ / READ_4B commands of at most four bytes each.
    pub fn read_range(&mut self, port: Port, addr: u32, buf: &mut [u8], use_4byte: bool) -> Result<()> {
        if self.engine.features(port).contains(EngineFeatures::MAPPED_READ) {
            return self.engine.read_mapped(port, addr, buf, use_4byte);
        }
        let width = AddressWidth::for_mode(use_4byte);
        let opcode = if use_4byte {
            opcodes::READ_4B
        } else {
            opcodes::READ
        };
        let mut chunk_addr = addr;
        for chunk in buf.chunks_mut(COMMAND_READ_CHUNK) {
            let len = chunk.len() as u32;
            self.run(port, SpiCommand::read(opcode, chunk_addr, width, chunk))?;
            chunk_addr = chunk_addr.wrapping_add(len);
        }
        Ok(())
    }

    /// Enter or leave 4-byte address mode, and latch it for mapped reads
    pub fn set_address_mode(&mut self, port: Port, enable: bool) -> Result<()> {
        let opcode = if enable { opcodes::EN4B } else { opcodes::EX4B };
        self.run(port, SpiCommand::simple(opcode))?;
        self.engine.set_address_latch(port, enable);
        Ok(())
    }

    /// Set or clear the vendor's quad-enable bit
    ///
    /// Vendors without a known QE location are left alone. Status is only
    /// rewritten when the bit actually changes.
    pub fn set_quad_mode(&mut self, port: Port, enable: bool) -> Result<()> {
        let mfr = (self.identify(port)? >> 16) as u8;
        let Some(qe) = quad_enable_bit(mfr) else {
            trace!("{}: no quad-enable bit known for vendor 0x{:02X}", port, mfr);
            return Ok(());
        };

        let sr1 = self.read_status(port)?;
        let sr2 = self.read_status2(port)?;
        let apply = |reg: u8, bit: u8| if enable { reg | bit } else { reg & !bit };
        let (new1, new2) = match qe {
            QuadEnableBit::Sr1(bit) => (apply(sr1, bit), sr2),
            QuadEnableBit::Sr2(bit) => (sr1, apply(sr2, bit)),
        };
        if (new1, new2) == (sr1, sr2) {
            return Ok(());
        }

        debug!("{}: status 0x{:02X}{:02X} -> 0x{:02X}{:02X}", port, sr2, sr1, new2, new1);
        self.write_enable(port)?;
        self.run(port, SpiCommand::write_reg(opcodes::WRSR, &[new1, new2]))?;
        self.wait_ready(port, self.engine.erase_timeout_ms())
    }

    /// Reconfigure `port` ahead of an erase, program or read
    ///
    /// A no-op on ports that do not report [`EngineFeatures::PORT_SETUP`].
    pub fn port_init(&mut self, port: Port, quad: bool, use_4byte: bool) -> Result<()> {
        let features = self.engine.features(port);
        if !features.contains(EngineFeatures::PORT_SETUP) {
            return Ok(());
        }
        self.engine.open_port(port, quad);
        if features.contains(EngineFeatures::QUAD_MODE) {
            self.set_quad_mode(port, quad)?;
        }
        self.set_address_mode(port, use_4byte)
    }
}

impl<E: CommandEngine> Clock for FlashDriver<E> {
    fn now_us(&mut self) -> u64 {
        self.engine.bus().now_us()
    }

    fn delay_us(&mut self, us: u32) {
        self.engine.bus().delay_us(us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sfdp_table, FakeEngine};
    use std::vec::Vec;

    fn driver() -> FlashDriver<FakeEngine> {
        FlashDriver::new(FakeEngine::new(64 * 1024))
    }

    #[test]
    fn test_page_chunks_respect_boundaries() {
        let data = [0u8; 300];
        let chunks: Vec<(u32, usize)> = PageChunks::new(0x10F0, &data)
            .map(|(addr, chunk)| (addr, chunk.len()))
            .collect();
        assert_eq!(chunks, [(0x10F0, 16), (0x1100, 256), (0x1200, 28)]);
    }

    #[test]
    fn test_page_chunks_aligned_full_pages() {
        let data = [0u8; 4096];
        let chunks = PageChunks::new(0x1000, &data);
        assert!(chunks.map(|(_, c)| c.len()).all(|n| n == 256));
        assert_eq!(PageChunks::new(0x1000, &data).count(), 16);
    }

    #[test]
    fn test_identify_packs_bytes() {
        let mut drv = driver();
        assert_eq!(drv.identify(Port::Pvt), Ok(0xEF4014));
    }

    #[test]
    fn test_identify_checked_rejects_floating_bus() {
        let mut drv = driver();
        drv.engine().id = [0xFF; 3];
        assert_eq!(drv.identify_checked(Port::Pvt), Err(Error::InvalidJedecId));
        drv.engine().id = [0; 3];
        assert_eq!(drv.identify_checked(Port::Pvt), Err(Error::InvalidJedecId));
    }

    #[test]
    fn test_discover_geometry() {
        let mut drv = driver();
        drv.engine().sfdp = sfdp_table(32 * 1024 * 1024, true);
        let ident = drv.discover_geometry(Port::Shd).unwrap();
        assert_eq!(ident.id, 0xEF4014);
        assert_eq!(ident.size, 32 * 1024 * 1024);
        assert!(ident.supports_4byte);
        assert_eq!(drv.engine().count(opcodes::RDSFDP), 2);
    }

    #[test]
    fn test_discover_geometry_without_sfdp() {
        let mut drv = driver();
        drv.engine().sfdp.clear();
        assert_eq!(drv.discover_geometry(Port::Pvt), Err(Error::SfdpInvalid));
    }

    #[test]
    fn test_program_range_one_pp_per_page() {
        let mut drv = driver();
        let data: Vec<u8> = (0..600u32).map(|i| i as u8).collect();
        drv.program_range(Port::Pvt, 0x1080, &data, false).unwrap();

        let eng = drv.engine();
        assert_eq!(eng.count(opcodes::PP), 3);
        assert_eq!(eng.count(opcodes::WREN), 3);
        assert_eq!(&eng.mem[0x1080..0x1080 + 600], &data[..]);
    }

    #[test]
    fn test_erase_is_idempotent() {
        let mut drv = driver();
        drv.engine().mem[0x2000..0x3000].fill(0);
        drv.erase_sector(Port::Pvt, 0x2000, false).unwrap();
        drv.erase_sector(Port::Pvt, 0x2000, false).unwrap();
        assert!(drv.engine().mem[0x2000..0x3000].iter().all(|&b| b == 0xFF));
        assert_eq!(drv.engine().mem[0x1FFF], 0xFF);
    }

    #[test]
    fn test_erase_times_out_on_elapsed_time() {
        let mut drv = driver();
        drv.engine().stuck_busy = true;
        assert_eq!(drv.erase_sector(Port::Pvt, 0, false), Err(Error::Timeout));
        let now = drv.engine().bus.now;
        assert!(now >= 500_000);
        assert!(now < 500_000 + 2 * u64::from(WAIT_READY_POLL_US));
    }

    #[test]
    fn test_read_range_by_command() {
        let mut drv = driver();
        drv.engine().features = EngineFeatures::empty();
        drv.engine().mem[0x100..0x10A].copy_from_slice(b"0123456789");
        let mut buf = [0u8; 10];
        drv.read_range(Port::Internal, 0x100, &mut buf, false).unwrap();
        assert_eq!(&buf, b"0123456789");
        assert_eq!(drv.engine().count(opcodes::READ), 3);
    }

    #[test]
    fn test_read_range_mapped() {
        let mut drv = driver();
        drv.engine().mem[0x40..0x44].copy_from_slice(&[1, 2, 3, 4]);
        let mut buf = [0u8; 4];
        drv.read_range(Port::Shd, 0x40, &mut buf, true).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(drv.engine().latch, Some(true));
        assert_eq!(drv.engine().count(opcodes::READ_4B), 0);
    }

    #[test]
    fn test_quad_mode_sets_sr2_bit_for_winbond() {
        let mut drv = driver();
        drv.engine().sr1 = 0x1C;
        drv.set_quad_mode(Port::Shd, true).unwrap();
        assert_eq!(drv.engine().writes, [[0x1C, opcodes::SR2_QE].to_vec()]);
        assert_eq!(drv.engine().sr2, opcodes::SR2_QE);

        // Already set: nothing written
        drv.set_quad_mode(Port::Shd, true).unwrap();
        assert_eq!(drv.engine().count(opcodes::WRSR), 1);
    }

    #[test]
    fn test_quad_mode_clears_sr1_bit_for_macronix() {
        let mut drv = driver();
        drv.engine().id = [opcodes::MFR_MACRONIX, 0x20, 0x16];
        drv.engine().sr1 = opcodes::SR1_QE | 0x04;
        drv.set_quad_mode(Port::Pvt, false).unwrap();
        assert_eq!(drv.engine().sr1, 0x04);
    }

    #[test]
    fn test_quad_mode_unknown_vendor_untouched() {
        let mut drv = driver();
        drv.engine().id = [0x01, 0x02, 0x03];
        drv.set_quad_mode(Port::Pvt, true).unwrap();
        assert_eq!(drv.engine().count(opcodes::RDSR), 0);
        assert_eq!(drv.engine().count(opcodes::WRSR), 0);
    }

    #[test]
    fn test_port_init_sequence() {
        let mut drv = driver();
        drv.port_init(Port::Bkp, false, true).unwrap();
        let eng = drv.engine();
        assert_eq!(eng.opened, [Port::Bkp]);
        assert!(eng.four_byte);
        assert_eq!(eng.latch, Some(true));
        assert_eq!(eng.opcodes.last(), Some(&opcodes::EN4B));
    }

    #[test]
    fn test_port_init_skipped_without_port_setup() {
        let mut drv = driver();
        drv.engine().features = EngineFeatures::MAPPED_READ;
        drv.port_init(Port::Pvt, false, true).unwrap();
        assert!(drv.engine().opened.is_empty());
        assert!(drv.engine().opcodes.is_empty());
    }
}
