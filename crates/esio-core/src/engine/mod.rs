//! SPI-NOR command engines
//!
//! A [`CommandEngine`] issues one SPI transaction on a particular controller
//! generation. The driver and dispatcher are written once against this trait;
//! the resident image picks the engine at build time.
//!
//! | Engine | Part | Ports |
//! |---|---|---|
//! | [`Fiu`] | NCT6694D | PVT, SHD, BKP |
//! | [`LegacyFiu`] | NCT6692D | PVT, SHD |
//! | [`Spim`] | NCT6694D on-die flash | internal |

mod fiu;
mod fiu_legacy;
mod spim;

pub use fiu::Fiu;
pub use fiu_legacy::LegacyFiu;
pub use spim::Spim;

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::hal::HardwareAccess;
use crate::mailbox::{Command, Port};
use crate::spi::{opcodes, AddressWidth, SpiCommand};

/// Controller generation an engine drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// FIU with the extended data buffer (NCT6694D)
    Fiu,
    /// FIU without the extended data buffer (NCT6692D)
    LegacyFiu,
    /// SPI master in front of the on-die flash (NCT6694D)
    Spim,
}

impl EngineKind {
    /// Stable lowercase name, used for image file names and logs
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Fiu => "fiu",
            Self::LegacyFiu => "fiu-legacy",
            Self::Spim => "spim",
        }
    }

    /// Tag byte embedded in resident images
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Fiu => b'F',
            Self::LegacyFiu => b'L',
            Self::Spim => b'S',
        }
    }

    /// Decode a tag byte
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'F' => Some(Self::Fiu),
            b'L' => Some(Self::LegacyFiu),
            b'S' => Some(Self::Spim),
            _ => None,
        }
    }

    /// Engine a resident image was built for, from its embedded marker
    ///
    /// Images carry [`IMAGE_MAGIC`] followed by the tag byte.
    pub fn from_image(image: &[u8]) -> Option<Self> {
        image
            .windows(IMAGE_MAGIC.len() + 1)
            .find(|w| w[..IMAGE_MAGIC.len()] == IMAGE_MAGIC)
            .and_then(|w| Self::from_tag(w[IMAGE_MAGIC.len()]))
    }
}

/// Marker preceding the engine tag inside resident images
pub const IMAGE_MAGIC: [u8; 3] = *b"ESR";

impl core::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// What the driver may do on a port beyond plain SPI transactions
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EngineFeatures: u8 {
        /// Init reads SFDP for capacity and addressing; otherwise id only
        const SFDP_INIT = 1 << 0;
        /// Port is reconfigured and address mode applied before each request
        const PORT_SETUP = 1 << 1;
        /// Quad mode is applied as part of port setup
        const QUAD_MODE = 1 << 2;
        /// Flash contents are readable through a memory-mapped window
        const MAPPED_READ = 1 << 3;
    }
}

/// One SPI transaction on a flash controller
///
/// `execute` accepts any command shape: short ones go out with automatic
/// chip select, longer ones hold chip select across several controller
/// transactions. Every engine polls its "done" flag after each phase.
pub trait CommandEngine {
    /// Register access the engine drives
    type Bus: HardwareAccess;

    /// The underlying bus
    fn bus(&mut self) -> &mut Self::Bus;

    /// Controller generation
    fn kind(&self) -> EngineKind;

    /// Whether `port` is wired to this controller
    fn supports_port(&self, port: Port) -> bool;

    /// Driver features available on `port`
    fn features(&self, port: Port) -> EngineFeatures;

    /// One-time controller setup when the resident program starts
    fn start(&mut self) {}

    /// Route pins and clocks to `port`
    fn open_port(&mut self, port: Port, quad: bool);

    /// Run one command, filling `cmd.read_buf`
    fn execute(&mut self, port: Port, cmd: &mut SpiCommand<'_>) -> Result<()>;

    /// Program up to one page; the caller has sent WREN and waits afterwards
    fn program_page(&mut self, port: Port, addr: u32, data: &[u8], width: AddressWidth) -> Result<()> {
        let opcode = page_program_opcode(width);
        self.execute(port, &mut SpiCommand::write(opcode, addr, width, data))
    }

    /// Copy flash contents from the memory-mapped window into `buf`
    ///
    /// Only called on ports reporting [`EngineFeatures::MAPPED_READ`].
    fn read_mapped(&mut self, _port: Port, _addr: u32, _buf: &mut [u8], _use_4byte: bool) -> Result<()> {
        Err(Error::UnsupportedCommand(Command::Read as u8))
    }

    /// Latch (or drop) 4-byte decoding for mapped reads on `port`
    fn set_address_latch(&mut self, _port: Port, _enable: bool) {}

    /// Housekeeping after an erase or program (cache invalidation)
    fn after_write(&mut self) {}

    /// Bound on the busy wait after a page program, 0 = unbounded
    fn program_timeout_ms(&self) -> u32;

    /// Bound on the busy wait after a sector erase, 0 = unbounded
    fn erase_timeout_ms(&self) -> u32 {
        500
    }
}

/// Page program opcode for an address width
pub const fn page_program_opcode(width: AddressWidth) -> u8 {
    match width {
        AddressWidth::FourByte => opcodes::PP_4B,
        _ => opcodes::PP,
    }
}

/// Split a data phase into bursts of at most `max` bytes, never leaving a
/// single-byte burst when `avoid_single` is set
///
/// Used by the FIU extended data buffer, which cannot stream one byte on its
/// own: a 17-byte tail goes out as 15 + 2 rather than 16 + 1.
pub(crate) fn next_burst(remaining: usize, max: usize, avoid_single: bool) -> usize {
    let n = remaining.min(max);
    if avoid_single && remaining - n == 1 && n > 2 {
        n - 1
    } else {
        n
    }
}
