//! Scripted debug target for host-side tests

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use zerocopy::IntoBytes;

use esio_core::mailbox::{
    Command, FlashInfoRecord, MailboxParams, State, BUFFER_ADDR, MAILBOX_ADDR, PARAMS_SIZE, WORKING_AREA_SIZE,
};

use crate::error::TargetError;
use crate::target::{DebugTarget, WorkingArea};

/// Target whose "resident program" answers every request instantly
///
/// With `complete_with` unset, requests stay Busy forever; otherwise they
/// finish after `busy_polls` reads of the state byte. Memory outside the
/// working area reads from `memory`, defaulting to 0xFF.
pub struct MockTarget {
    pub halted: bool,
    pub area_address: u32,
    pub area: Vec<u8>,
    pub memory: BTreeMap<u32, u8>,
    pub complete_with: Option<State>,
    pub busy_polls: u32,
    pub init_record: FlashInfoRecord,
    pub read_fill: u8,
    pub submitted: Vec<MailboxParams>,
    pub state_writes: Vec<u8>,
    pub direct_reads: Vec<(u32, usize)>,
    pub now: u64,
    deferred: Option<(State, u32)>,
    pub allocs: usize,
    pub frees: usize,
    pub starts: usize,
    pub halts: usize,
}

impl MockTarget {
    pub fn new() -> Self {
        Self {
            halted: true,
            area_address: MAILBOX_ADDR,
            area: vec![0; WORKING_AREA_SIZE],
            memory: BTreeMap::new(),
            complete_with: None,
            busy_polls: 0,
            init_record: FlashInfoRecord::new(0xEF4014, 0x10_0000, false),
            read_fill: 0xA5,
            submitted: Vec::new(),
            state_writes: Vec::new(),
            direct_reads: Vec::new(),
            now: 0,
            deferred: None,
            allocs: 0,
            frees: 0,
            starts: 0,
            halts: 0,
        }
    }

    fn area_offset(addr: u32) -> Option<usize> {
        addr.checked_sub(MAILBOX_ADDR)
            .map(|off| off as usize)
            .filter(|&off| off < WORKING_AREA_SIZE)
    }

    fn serve(&mut self, params: MailboxParams) {
        self.submitted.push(params);
        let Some(state) = self.complete_with else {
            return;
        };
        let buffer = (BUFFER_ADDR - MAILBOX_ADDR) as usize;
        match Command::try_from(params.cmd) {
            Ok(Command::Init) => {
                let record = self.init_record;
                self.area[buffer..buffer + record.as_bytes().len()].copy_from_slice(record.as_bytes());
            }
            Ok(Command::Read) => {
                let len = params.length.get() as usize;
                self.area[buffer..buffer + len].fill(self.read_fill);
            }
            _ => {}
        }
        if self.busy_polls > 0 {
            self.deferred = Some((state, self.busy_polls));
        } else {
            self.area[0] = state.code();
        }
    }

    fn poll_state(&mut self) {
        match self.deferred {
            Some((state, 0)) => {
                self.area[0] = state.code();
                self.deferred = None;
            }
            Some((state, left)) => self.deferred = Some((state, left - 1)),
            None => {}
        }
    }
}

impl DebugTarget for MockTarget {
    fn is_halted(&mut self) -> bool {
        self.halted
    }

    fn halt(&mut self) -> Result<(), TargetError> {
        self.halts += 1;
        self.halted = true;
        Ok(())
    }

    fn read_memory(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), TargetError> {
        if let Some(off) = Self::area_offset(addr) {
            if off == 0 {
                self.poll_state();
            }
            buf.copy_from_slice(&self.area[off..off + buf.len()]);
            return Ok(());
        }
        self.direct_reads.push((addr, buf.len()));
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.memory.get(&(addr + i as u32)).copied().unwrap_or(0xFF);
        }
        Ok(())
    }

    fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<(), TargetError> {
        let off = Self::area_offset(addr).ok_or(TargetError::MemoryAccess { addr, len: data.len() })?;
        self.area[off..off + data.len()].copy_from_slice(data);
        if addr == MAILBOX_ADDR && data.len() >= PARAMS_SIZE {
            self.state_writes.push(data[0]);
            if let Some(params) = MailboxParams::parse(data) {
                if params.state == State::Busy.code() {
                    self.serve(params);
                }
            }
        }
        Ok(())
    }

    fn alloc_working_area(&mut self, size: usize) -> Result<WorkingArea, TargetError> {
        self.allocs += 1;
        Ok(WorkingArea {
            address: self.area_address,
            size,
        })
    }

    fn free_working_area(&mut self, _area: WorkingArea) {
        self.frees += 1;
    }

    fn start_algorithm(&mut self, _entry: u32) -> Result<(), TargetError> {
        self.starts += 1;
        self.halted = false;
        Ok(())
    }

    fn wait_algorithm(&mut self, _timeout_ms: u32) -> Result<(), TargetError> {
        Ok(())
    }

    fn keep_alive(&mut self) {
        self.now += 5;
    }

    fn now_ms(&mut self) -> u64 {
        self.now
    }
}
