//! Simulated debug target
//!
//! [`SimTarget`] implements [`DebugTarget`] over a [`SimBus`]. Starting an
//! algorithm loads the real [`Dispatcher`] for the engine named in the
//! downloaded image; from then on every host access to target RAM gives the
//! resident side a chance to serve the mailbox, the way a free-running core
//! would between two probe transactions.

use log::{debug, warn};

use esio_core::dispatcher::{Dispatcher, Step};
use esio_core::engine::{CommandEngine, EngineKind, Fiu, LegacyFiu, Spim};
use esio_core::mailbox::{
    Mailbox, MailboxParams, MemoryMailbox, Port, State, MAILBOX_ADDR, MAILBOX_REGION_SIZE, PROGRAM_ADDR,
    PROGRAM_SIZE, WORKING_AREA_SIZE,
};
use esio_host::error::TargetError;
use esio_host::target::{DebugTarget, WorkingArea};

use crate::bus::SimBus;
use crate::config::SimConfig;
use crate::spi_nor::SpiNor;

/// One mailbox request served by the resident dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Header as the dispatcher saw it
    pub params: MailboxParams,
    /// State the dispatcher left behind
    pub status: State,
    /// Flash opcodes the request produced, by port
    pub opcodes: Vec<(Port, u8)>,
}

impl Transaction {
    /// How many times `opcode` went out on `port`
    pub fn count(&self, port: Port, opcode: u8) -> usize {
        self.opcodes.iter().filter(|&&(p, op)| p == port && op == opcode).count()
    }
}

enum Core {
    Stopped(SimBus),
    Fiu(Dispatcher<Fiu<SimBus>>),
    LegacyFiu(Dispatcher<LegacyFiu<SimBus>>),
    Spim(Dispatcher<Spim<SimBus>>),
}

impl Core {
    fn load(bus: SimBus, kind: EngineKind) -> Self {
        match kind {
            EngineKind::Fiu => Core::Fiu(Dispatcher::new(Fiu::new(bus))),
            EngineKind::LegacyFiu => Core::LegacyFiu(Dispatcher::new(LegacyFiu::new(bus))),
            EngineKind::Spim => Core::Spim(Dispatcher::new(Spim::new(bus))),
        }
    }

    fn into_bus(self) -> SimBus {
        match self {
            Core::Stopped(bus) => bus,
            Core::Fiu(d) => d.into_engine().into_inner(),
            Core::LegacyFiu(d) => d.into_engine().into_inner(),
            Core::Spim(d) => d.into_engine().into_inner(),
        }
    }

    fn bus(&mut self) -> &mut SimBus {
        match self {
            Core::Stopped(bus) => bus,
            Core::Fiu(d) => d.driver().engine().bus(),
            Core::LegacyFiu(d) => d.driver().engine().bus(),
            Core::Spim(d) => d.driver().engine().bus(),
        }
    }

    fn start<M: Mailbox>(&mut self, mb: &mut M) {
        match self {
            Core::Stopped(_) => {}
            Core::Fiu(d) => d.start(mb),
            Core::LegacyFiu(d) => d.start(mb),
            Core::Spim(d) => d.start(mb),
        }
    }

    fn step<M: Mailbox>(&mut self, mb: &mut M) -> Step {
        match self {
            Core::Stopped(_) => Step::Halted,
            Core::Fiu(d) => d.step(mb),
            Core::LegacyFiu(d) => d.step(mb),
            Core::Spim(d) => d.step(mb),
        }
    }

    fn is_running(&self) -> bool {
        !matches!(self, Core::Stopped(_))
    }
}

/// A simulated eSIO behind a debug probe
pub struct SimTarget {
    config: SimConfig,
    core: Core,
    halted: bool,
    ram: Vec<u8>,
    area: Option<WorkingArea>,
    host_ms: u64,
    transactions: Vec<Transaction>,
}

impl SimTarget {
    /// Target built from `config`
    pub fn new(config: SimConfig) -> Self {
        let mut bus = SimBus::new(config.legacy_fiu());
        for (port, flash) in &config.flashes {
            bus.attach(*port, SpiNor::new(flash.clone()));
        }
        Self {
            halted: config.start_halted,
            config,
            core: Core::Stopped(bus),
            ram: vec![0; WORKING_AREA_SIZE],
            area: None,
            host_ms: 0,
            transactions: Vec::new(),
        }
    }

    /// Board description
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Requests served so far
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Currently allocated working area
    pub fn area(&self) -> Option<WorkingArea> {
        self.area
    }

    /// The simulated bus
    pub fn bus(&mut self) -> &mut SimBus {
        self.core.bus()
    }

    /// Flash part on `port`
    pub fn flash(&mut self, port: Port) -> Option<&mut SpiNor> {
        self.core.bus().flashes_mut().get_mut(port)
    }

    fn ram_offset(addr: u32, len: usize) -> Option<usize> {
        let off = addr.checked_sub(MAILBOX_ADDR)? as usize;
        (off + len <= WORKING_AREA_SIZE).then_some(off)
    }

    fn stop(&mut self) {
        let core = core::mem::replace(&mut self.core, Core::Stopped(SimBus::default()));
        self.core = Core::Stopped(core.into_bus());
    }

    fn mailbox(ram: &mut [u8]) -> Result<MemoryMailbox<&mut [u8]>, TargetError> {
        MemoryMailbox::new(&mut ram[..MAILBOX_REGION_SIZE]).map_err(|e| TargetError::Transport(e.to_string()))
    }

    /// Let the resident side serve whatever the mailbox holds
    fn pump(&mut self) -> Result<(), TargetError> {
        if !self.core.is_running() {
            return Ok(());
        }
        let mut mb = Self::mailbox(&mut self.ram)?;
        loop {
            let params = MailboxParams::parse(mb.as_bytes()).unwrap_or_default();
            match self.core.step(&mut mb) {
                Step::Waiting | Step::Halted => return Ok(()),
                Step::Completed | Step::Failed(_) => {
                    let status = mb.state();
                    let opcodes = self.core.bus().flashes_mut().take_log();
                    debug!(
                        "sim: cmd {} port 0x{:02X} addr 0x{:08X} len {} -> {:?}",
                        params.cmd,
                        params.port,
                        params.address.get(),
                        params.length.get(),
                        status
                    );
                    self.transactions.push(Transaction {
                        params,
                        status,
                        opcodes,
                    });
                }
            }
        }
    }
}

impl DebugTarget for SimTarget {
    fn is_halted(&mut self) -> bool {
        self.halted
    }

    fn halt(&mut self) -> Result<(), TargetError> {
        self.stop();
        self.halted = true;
        Ok(())
    }

    fn read_memory(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), TargetError> {
        if let Some(off) = Self::ram_offset(addr, buf.len()) {
            self.pump()?;
            buf.copy_from_slice(&self.ram[off..off + buf.len()]);
            return Ok(());
        }
        if self.core.bus().read_window(addr, buf) {
            return Ok(());
        }
        Err(TargetError::MemoryAccess { addr, len: buf.len() })
    }

    fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<(), TargetError> {
        let off = Self::ram_offset(addr, data.len()).ok_or(TargetError::MemoryAccess {
            addr,
            len: data.len(),
        })?;
        self.ram[off..off + data.len()].copy_from_slice(data);
        self.pump()
    }

    fn alloc_working_area(&mut self, size: usize) -> Result<WorkingArea, TargetError> {
        if self.area.is_some() || size > WORKING_AREA_SIZE {
            return Err(TargetError::NoWorkingArea(size));
        }
        let area = WorkingArea {
            address: self.config.area_address,
            size,
        };
        self.area = Some(area);
        Ok(area)
    }

    fn free_working_area(&mut self, area: WorkingArea) {
        if self.area == Some(area) {
            self.area = None;
        } else {
            warn!("sim: freeing unknown working area at 0x{:08X}", area.address);
        }
    }

    fn start_algorithm(&mut self, entry: u32) -> Result<(), TargetError> {
        if !self.halted {
            return Err(TargetError::Transport("core must be halted to start an algorithm".into()));
        }
        if entry != PROGRAM_ADDR {
            return Err(TargetError::Transport(format!("no resident program at 0x{:08X}", entry)));
        }
        let off = (PROGRAM_ADDR - MAILBOX_ADDR) as usize;
        let kind = EngineKind::from_image(&self.ram[off..off + PROGRAM_SIZE])
            .ok_or_else(|| TargetError::Transport("image carries no engine marker".into()))?;

        let bus = core::mem::replace(&mut self.core, Core::Stopped(SimBus::default())).into_bus();
        self.core = Core::load(bus, kind);
        let mut mb = Self::mailbox(&mut self.ram)?;
        self.core.start(&mut mb);
        self.halted = false;
        debug!("sim: {} resident running", kind);
        Ok(())
    }

    fn wait_algorithm(&mut self, timeout_ms: u32) -> Result<(), TargetError> {
        if self.halted {
            Ok(())
        } else {
            Err(TargetError::AlgorithmTimeout(timeout_ms))
        }
    }

    fn keep_alive(&mut self) {
        self.host_ms += self.config.keep_alive_ms;
    }

    fn now_ms(&mut self) -> u64 {
        self.host_ms
    }
}
