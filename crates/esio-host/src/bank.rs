//! Flash bank driver
//!
//! A bank is one flash device reachable through an eSIO part, named by the
//! base address it appears at in the target's memory map. The base selects
//! the port, and together with the series the resident image to load.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use log::{info, warn};
use maybe_async::maybe_async;

use esio_core::engine::EngineKind;
use esio_core::mailbox::Port;
use esio_core::regs::{FIU_WINDOW_BASE, FIU_WINDOW_STRIDE, LEGACY_SHD_WINDOW, SPIM_FLASH_BASE};
use esio_core::spi::SECTOR_SIZE;

use crate::chips::{ChipDatabase, ChipInfo, EsioSeries};
use crate::error::{HostError, Result};
use crate::loader::ImageProvider;
use crate::progress::BankProgress;
use crate::sequencer::{OperationSequencer, SequencerConfig};
use crate::target::DebugTarget;

/// Name reported for flash that is not part of the eSIO itself
pub const EXTERNAL_FLASH_NAME: &str = "External Flash";

const PVT_BASE: u32 = FIU_WINDOW_BASE;
const SHD_BASE: u32 = FIU_WINDOW_BASE + FIU_WINDOW_STRIDE;
const BKP_BASE: u32 = FIU_WINDOW_BASE + 2 * FIU_WINDOW_STRIDE;

/// Bank configuration as given by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankConfig {
    /// Address the bank is mapped at
    pub base: u32,
    /// eSIO part name
    pub chip: String,
}

/// Port a base address selects, and whether that port is the part's own flash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSelection {
    /// Mailbox port
    pub port: Port,
    /// Flash is on-chip and must match the table id
    pub on_chip: bool,
    /// Resident image that serves this port
    pub engine: EngineKind,
}

/// Map a bank base address to a port for `series`
pub fn select_port(series: EsioSeries, base: u32) -> Option<PortSelection> {
    let (port, on_chip) = match (series, base) {
        (EsioSeries::Nct6692, PVT_BASE) => (Port::Pvt, true),
        (EsioSeries::Nct6692, LEGACY_SHD_WINDOW) => (Port::Shd, false),
        (EsioSeries::Nct6694, PVT_BASE) => (Port::Pvt, false),
        (EsioSeries::Nct6694, SHD_BASE) => (Port::Shd, false),
        (EsioSeries::Nct6694, BKP_BASE) => (Port::Bkp, false),
        (EsioSeries::Nct6694, SPIM_FLASH_BASE) => (Port::Internal, true),
        _ => return None,
    };
    let engine = match (series, port) {
        (EsioSeries::Nct6692, _) => EngineKind::LegacyFiu,
        (EsioSeries::Nct6694, Port::Internal) => EngineKind::Spim,
        (EsioSeries::Nct6694, _) => EngineKind::Fiu,
    };
    Some(PortSelection { port, on_chip, engine })
}

/// One erasable sector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashSector {
    /// Offset from the bank base
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
}

/// What probing found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedFlash {
    /// Device name
    pub name: String,
    /// JEDEC id
    pub id: u32,
    /// Size in bytes
    pub size: u32,
    /// Requests use 4-byte addressing
    pub addr_4byte: bool,
    /// Uniform 4 KiB sectors covering the device
    pub sectors: Vec<FlashSector>,
}

/// A flash bank behind an eSIO part
#[derive(Debug)]
pub struct FlashBank {
    base: u32,
    chip: ChipInfo,
    selection: PortSelection,
    sequencer: OperationSequencer,
    probed: Option<ProbedFlash>,
}

impl FlashBank {
    /// Resolve `config` against `chips` and fetch the matching image
    pub fn new<I: ImageProvider + ?Sized>(
        config: &BankConfig,
        chips: &ChipDatabase,
        images: &I,
        sequencer: SequencerConfig,
    ) -> Result<Self> {
        let chip = chips
            .find(&config.chip)
            .cloned()
            .ok_or_else(|| HostError::UnknownChip(config.chip.clone()))?;
        let selection = select_port(chip.series, config.base).ok_or(HostError::InvalidBase {
            base: config.base,
            series: chip.series.name(),
        })?;
        let image = images.image(selection.engine)?.into_owned();
        let sequencer = OperationSequencer::new(sequencer, selection.engine, image, selection.port);
        Ok(Self {
            base: config.base,
            chip,
            selection,
            sequencer,
            probed: None,
        })
    }

    /// Base address of the bank
    pub fn base(&self) -> u32 {
        self.base
    }

    /// The eSIO part
    pub fn chip(&self) -> &ChipInfo {
        &self.chip
    }

    /// Port and engine in use
    pub fn selection(&self) -> PortSelection {
        self.selection
    }

    /// Probe result, if probed
    pub fn probed(&self) -> Option<&ProbedFlash> {
        self.probed.as_ref()
    }

    /// Whether `probe` has succeeded
    pub fn is_probed(&self) -> bool {
        self.probed.is_some()
    }

    /// Number of sectors, zero before probing
    pub fn num_sectors(&self) -> usize {
        self.probed.as_ref().map_or(0, |p| p.sectors.len())
    }

    fn require_probed(&self) -> Result<&ProbedFlash> {
        self.probed.as_ref().ok_or(HostError::NotProbed)
    }

    fn require_halted<T: DebugTarget>(target: &mut T) -> Result<()> {
        if target.is_halted() {
            Ok(())
        } else {
            warn!("Target not halted");
            Err(HostError::NotHalted)
        }
    }

    fn check_range(&self, offset: u32, len: usize) -> Result<bool> {
        let flash = self.require_probed()?;
        let end = u64::from(offset) + len as u64;
        if end > u64::from(flash.size) {
            return Err(HostError::OutOfRange {
                offset,
                len,
                size: flash.size,
            });
        }
        Ok(flash.addr_4byte)
    }

    /// Identify the flash and build the sector list
    #[maybe_async]
    pub async fn probe<T: DebugTarget>(&mut self, target: &mut T) -> Result<()> {
        Self::require_halted(target)?;
        self.probed = None;

        info!(
            "Probing {} ({}) {} flash at 0x{:08x}",
            self.chip.name, self.chip.series, self.selection.port, self.base
        );
        let record = self.sequencer.identify(target).await?;
        let id = record.id.get();
        let addr_4byte = record.addr_4byte != 0;

        let (name, size) = if self.selection.on_chip {
            if id != self.chip.id {
                warn!("On-chip flash answered 0x{:08x}, expected 0x{:08x}", id, self.chip.id);
                return Err(HostError::IdMismatch {
                    expected: self.chip.id,
                    found: id,
                });
            }
            (self.chip.name.clone(), self.chip.size)
        } else {
            (EXTERNAL_FLASH_NAME.to_string(), record.size.get())
        };
        if size == 0 {
            warn!("Flash 0x{:08x} reported no size", id);
        }

        let sectors = (0..size / SECTOR_SIZE)
            .map(|i| FlashSector {
                offset: i * SECTOR_SIZE,
                size: SECTOR_SIZE,
            })
            .collect();
        info!("Found {} (ID 0x{:08x}), {} bytes", name, id, size);
        self.probed = Some(ProbedFlash {
            name,
            id,
            size,
            addr_4byte,
            sectors,
        });
        Ok(())
    }

    /// Probe unless already probed
    #[maybe_async]
    pub async fn auto_probe<T: DebugTarget>(&mut self, target: &mut T) -> Result<()> {
        if self.is_probed() {
            return Ok(());
        }
        self.probe(target).await
    }

    /// Erase sectors `first..=last`
    #[maybe_async]
    pub async fn erase<T: DebugTarget, P: BankProgress>(
        &mut self,
        target: &mut T,
        first: usize,
        last: usize,
        progress: &mut P,
    ) -> Result<()> {
        Self::require_halted(target)?;
        let flash = self.require_probed()?;
        let count = flash.sectors.len();
        if first > last || last >= count {
            return Err(HostError::InvalidSectors { first, last, count });
        }
        let addr = flash.sectors[first].offset;
        let use_4byte = flash.addr_4byte;

        info!("Erasing sectors {}..={}", first, last);
        self.sequencer
            .erase(target, addr, last - first + 1, use_4byte, progress)
            .await?;
        progress.complete();
        Ok(())
    }

    /// Program `data` at `offset`; the range must already be erased
    #[maybe_async]
    pub async fn program<T: DebugTarget, P: BankProgress>(
        &mut self,
        target: &mut T,
        offset: u32,
        data: &[u8],
        progress: &mut P,
    ) -> Result<()> {
        Self::require_halted(target)?;
        let use_4byte = self.check_range(offset, data.len())?;

        info!("Writing {} bytes at 0x{:08x}", data.len(), offset);
        self.sequencer
            .program(target, offset, data, use_4byte, progress)
            .await?;
        progress.complete();
        Ok(())
    }

    /// Read `buf.len()` bytes at `offset`
    ///
    /// Flash that fits the 3-byte window is read straight from the mapped
    /// window; 4-byte flash goes through the resident program.
    #[maybe_async]
    pub async fn read<T: DebugTarget, P: BankProgress>(
        &mut self,
        target: &mut T,
        offset: u32,
        buf: &mut [u8],
        progress: &mut P,
    ) -> Result<()> {
        Self::require_halted(target)?;
        let use_4byte = self.check_range(offset, buf.len())?;

        if use_4byte {
            self.sequencer
                .read(target, offset, buf, use_4byte, progress)
                .await?;
        } else {
            progress.reading(buf.len());
            target.read_memory(self.base + offset, buf).await?;
            progress.read_progress(buf.len());
        }
        progress.complete();
        Ok(())
    }

    /// Compare flash at `offset` with `expected`
    #[maybe_async]
    pub async fn verify<T: DebugTarget, P: BankProgress>(
        &mut self,
        target: &mut T,
        offset: u32,
        expected: &[u8],
        progress: &mut P,
    ) -> Result<()> {
        let mut actual = vec![0u8; expected.len()];
        self.read(target, offset, &mut actual, progress).await?;

        if let Some(i) = actual.iter().zip(expected).position(|(a, e)| a != e) {
            warn!("Verify failed at offset 0x{:08x}", offset + i as u32);
            return Err(HostError::VerifyMismatch {
                offset: offset + i as u32,
                expected: expected[i],
                found: actual[i],
            });
        }
        info!("Verified {} bytes at 0x{:08x}", expected.len(), offset);
        Ok(())
    }

    /// One-line description of the probed device
    pub fn info(&self) -> String {
        match &self.probed {
            Some(flash) => format!("Device '{}' (ID 0x{:08x})", flash.name, flash.id),
            None => format!(
                "{} flash bank at 0x{:08x} not probed yet",
                self.chip.series, self.base
            ),
        }
    }
}

#[cfg(all(test, feature = "is_sync"))]
mod tests {
    use super::*;
    use crate::loader::StaticImages;
    use crate::progress::NoProgress;
    use crate::test_support::MockTarget;
    use esio_core::mailbox::{Command, FlashInfoRecord, State};

    fn images() -> StaticImages {
        StaticImages::new()
            .with(EngineKind::Fiu, vec![1; 32])
            .with(EngineKind::LegacyFiu, vec![2; 32])
            .with(EngineKind::Spim, vec![3; 32])
    }

    fn bank(chip: &str, base: u32) -> Result<FlashBank> {
        let config = BankConfig {
            base,
            chip: chip.into(),
        };
        FlashBank::new(&config, &ChipDatabase::builtin(), &images(), SequencerConfig::default())
    }

    fn answering() -> MockTarget {
        let mut target = MockTarget::new();
        target.complete_with = Some(State::Idle);
        target
    }

    #[test]
    fn test_port_selection_table() {
        let sel = select_port(EsioSeries::Nct6692, 0x6000_0000).unwrap();
        assert_eq!((sel.port, sel.on_chip, sel.engine), (Port::Pvt, true, EngineKind::LegacyFiu));
        let sel = select_port(EsioSeries::Nct6692, 0x6400_0000).unwrap();
        assert_eq!((sel.port, sel.on_chip), (Port::Shd, false));
        let sel = select_port(EsioSeries::Nct6694, 0x7000_0000).unwrap();
        assert_eq!((sel.port, sel.engine), (Port::Shd, EngineKind::Fiu));
        let sel = select_port(EsioSeries::Nct6694, 0x8000_0000).unwrap();
        assert_eq!(sel.port, Port::Bkp);
        let sel = select_port(EsioSeries::Nct6694, 0x0008_0000).unwrap();
        assert_eq!((sel.port, sel.on_chip, sel.engine), (Port::Internal, true, EngineKind::Spim));

        assert!(select_port(EsioSeries::Nct6692, 0x7000_0000).is_none());
        assert!(select_port(EsioSeries::Nct6694, 0x6400_0000).is_none());
        assert!(select_port(EsioSeries::Nct6692, 0x0008_0000).is_none());
    }

    #[test]
    fn test_configuration_errors() {
        assert!(matches!(bank("NCT0000", 0x6000_0000), Err(HostError::UnknownChip(_))));
        assert!(matches!(
            bank("NCT6801D", 0x8000_0000),
            Err(HostError::InvalidBase { base: 0x8000_0000, .. })
        ));
    }

    #[test]
    fn test_probe_external_flash() {
        let mut target = answering();
        target.init_record = FlashInfoRecord::new(0xC22018, 0x100_0000, false);
        let mut bank = bank("NCT6694B", 0x7000_0000).unwrap();
        assert!(bank.info().contains("not probed"));

        bank.probe(&mut target).unwrap();
        assert_eq!(bank.num_sectors(), 4096);
        assert_eq!(bank.info(), "Device 'External Flash' (ID 0x00c22018)");
        assert_eq!(target.submitted[0].port, Port::Shd.code());
        assert_eq!(target.submitted[0].cmd, Command::Init as u8);
    }

    #[test]
    fn test_probe_on_chip_id_mismatch() {
        let mut target = answering();
        target.init_record = FlashInfoRecord::new(0xEF4014, 0, false);
        let mut bank = bank("NCT6694B", 0x0008_0000).unwrap();
        let err = bank.probe(&mut target).unwrap_err();
        assert_eq!(
            err,
            HostError::IdMismatch {
                expected: 0xEF4015,
                found: 0xEF4014
            }
        );
        assert!(!bank.is_probed());
        assert_eq!(bank.num_sectors(), 0);
    }

    #[test]
    fn test_probe_on_chip_uses_table_size() {
        let mut target = answering();
        target.init_record = FlashInfoRecord::new(0xEF4014, 0, false);
        let mut bank = bank("NCT6801D", 0x6000_0000).unwrap();
        bank.auto_probe(&mut target).unwrap();
        bank.auto_probe(&mut target).unwrap();
        assert_eq!(target.submitted.len(), 1);
        assert_eq!(bank.num_sectors(), 256);
        assert_eq!(bank.info(), "Device 'NCT6801D' (ID 0x00ef4014)");
    }

    #[test]
    fn test_operations_need_halt_and_probe() {
        let mut target = answering();
        let mut bank = bank("NCT6694B", 0x7000_0000).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(bank.read(&mut target, 0, &mut buf, &mut NoProgress), Err(HostError::NotProbed));
        target.halted = false;
        assert_eq!(bank.erase(&mut target, 0, 0, &mut NoProgress), Err(HostError::NotHalted));
        assert_eq!(bank.probe(&mut target), Err(HostError::NotHalted));
    }

    #[test]
    fn test_erase_bounds_and_addresses() {
        let mut target = answering();
        let mut bank = bank("NCT6694B", 0x7000_0000).unwrap();
        bank.probe(&mut target).unwrap();
        assert!(matches!(
            bank.erase(&mut target, 5, 3, &mut NoProgress),
            Err(HostError::InvalidSectors { .. })
        ));
        assert!(matches!(
            bank.erase(&mut target, 0, 256, &mut NoProgress),
            Err(HostError::InvalidSectors { .. })
        ));

        target.submitted.clear();
        bank.erase(&mut target, 3, 5, &mut NoProgress).unwrap();
        let addrs: Vec<u32> = target.submitted.iter().map(|p| p.address.get()).collect();
        assert_eq!(addrs, [0x3000, 0x4000, 0x5000]);
        assert!(target.submitted.iter().all(|p| p.length.get() == 4096));
    }

    #[test]
    fn test_read_paths() {
        let mut target = answering();
        target.memory.insert(0x7000_0010, 0x42);
        let mut bank = bank("NCT6694B", 0x7000_0000).unwrap();
        bank.probe(&mut target).unwrap();

        let mut buf = [0u8; 2];
        bank.read(&mut target, 0x10, &mut buf, &mut NoProgress).unwrap();
        assert_eq!(buf, [0x42, 0xFF]);
        assert_eq!(target.direct_reads, [(0x7000_0010, 2)]);

        let mut target = answering();
        target.init_record = FlashInfoRecord::new(0xEF4019, 0x200_0000, true);
        bank.probe(&mut target).unwrap();
        let mut buf = [0u8; 6000];
        bank.read(&mut target, 0x100_0000, &mut buf, &mut NoProgress).unwrap();
        assert!(buf.iter().all(|&b| b == 0xA5));
        let reads: Vec<(u8, u8, u32)> = target
            .submitted
            .iter()
            .skip(1)
            .map(|p| (p.cmd, p.addr_4byte, p.length.get()))
            .collect();
        assert_eq!(reads, [(3, 1, 4096), (3, 1, 1904)]);
        assert!(target.direct_reads.is_empty());
    }

    #[test]
    fn test_verify_reports_first_mismatch() {
        let mut target = answering();
        target.memory.insert(0x7000_0000, 0xFF);
        target.memory.insert(0x7000_0001, 0x00);
        let mut bank = bank("NCT6694B", 0x7000_0000).unwrap();
        bank.probe(&mut target).unwrap();

        bank.verify(&mut target, 0, &[0xFF], &mut NoProgress).unwrap();
        let err = bank.verify(&mut target, 0, &[0xFF, 0xFF, 0xFF], &mut NoProgress).unwrap_err();
        assert_eq!(
            err,
            HostError::VerifyMismatch {
                offset: 1,
                expected: 0xFF,
                found: 0x00
            }
        );
    }

    #[test]
    fn test_out_of_range_program() {
        let mut target = answering();
        let mut bank = bank("NCT6694B", 0x7000_0000).unwrap();
        bank.probe(&mut target).unwrap();
        let err = bank.program(&mut target, 0x10_0000 - 2, &[0; 4], &mut NoProgress).unwrap_err();
        assert!(matches!(err, HostError::OutOfRange { .. }));
    }
}
