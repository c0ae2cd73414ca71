//! Host side of the mailbox protocol
//!
//! Every top-level operation opens a loader session, splits the work into
//! buffer-sized requests, submits them one at a time and closes the session
//! again, also on failure. A request is submitted by writing the header with
//! state Idle, then again with state Busy, and polling the state byte until
//! the resident program moves it off Busy.

use alloc::vec::Vec;

use log::{debug, info, warn};
use maybe_async::maybe_async;
use zerocopy::IntoBytes;

use esio_core::engine::EngineKind;
use esio_core::mailbox::{
    Command, FlashInfoRecord, MailboxParams, Port, State, BUFFER_ADDR, BUFFER_SIZE, MAILBOX_ADDR, STATE_OFFSET,
};
use esio_core::spi::SECTOR_SIZE;

use crate::error::{HostError, Result};
use crate::loader::LoaderController;
use crate::progress::BankProgress;
use crate::target::DebugTarget;

/// Default bound on one request and on stopping the resident program
pub const DEFAULT_TIMEOUT_MS: u32 = 8000;

const ADDRESS_SPACE: u64 = 1 << 32;

/// Sequencer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerConfig {
    /// Bound on waiting for one request, and on `quit`
    pub timeout_ms: u32,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Runs bank operations through the resident program on one port
#[derive(Debug)]
pub struct OperationSequencer {
    config: SequencerConfig,
    loader: LoaderController,
    engine: EngineKind,
    image: Vec<u8>,
    port: Port,
}

impl OperationSequencer {
    /// Sequencer for `port`, loading `image` for `engine`
    pub fn new(config: SequencerConfig, engine: EngineKind, image: Vec<u8>, port: Port) -> Self {
        Self {
            config,
            loader: LoaderController::new(config.timeout_ms),
            engine,
            image,
            port,
        }
    }

    /// Settings in use
    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Port requests are addressed to
    pub fn port(&self) -> Port {
        self.port
    }

    /// Engine of the loaded image
    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    /// The loader, for session inspection
    pub fn loader(&self) -> &LoaderController {
        &self.loader
    }

    /// Reject a range whose end lies past the 32-bit address space
    fn check_span(addr: u32, len: usize) -> Result<()> {
        let end = u64::from(addr) + len as u64;
        if end > ADDRESS_SPACE {
            return Err(HostError::AddressOverflow { addr, len });
        }
        Ok(())
    }

    fn request(&self, cmd: Command, address: u32, length: usize, use_4byte: bool) -> MailboxParams {
        MailboxParams::request(cmd, self.port, use_4byte, address, length as u32)
    }

    #[maybe_async]
    async fn begin<T: DebugTarget>(&mut self, target: &mut T) -> Result<()> {
        self.loader.init(target, self.engine, &self.image).await
    }

    /// Close the session, keeping the operation's own error if it failed
    #[maybe_async]
    async fn finish<T: DebugTarget, R>(&mut self, target: &mut T, result: Result<R>) -> Result<R> {
        let quit = self.loader.quit(target).await;
        match (result, quit) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(quit_err)) => {
                warn!("Teardown after failed operation also failed: {:?}", quit_err);
                Err(e)
            }
        }
    }

    /// Submit one request and wait for the resident program to finish it
    #[maybe_async]
    pub async fn submit<T: DebugTarget>(&mut self, target: &mut T, params: MailboxParams) -> Result<()> {
        target
            .write_memory(MAILBOX_ADDR, params.with_state(State::Idle).as_bytes())
            .await?;
        target
            .write_memory(MAILBOX_ADDR, params.with_state(State::Busy).as_bytes())
            .await?;
        self.wait_done(target).await
    }

    #[maybe_async]
    async fn wait_done<T: DebugTarget>(&mut self, target: &mut T) -> Result<()> {
        let timeout = self.config.timeout_ms;
        let start = target.now_ms();
        loop {
            let code = target.read_u8(MAILBOX_ADDR + STATE_OFFSET as u32).await?;
            target.keep_alive().await;
            match State::from_code(code) {
                State::Idle => return Ok(()),
                State::Error(code) => {
                    warn!("Flash operation failed, status 0x{:02X}", code);
                    return Err(HostError::Failure(code));
                }
                State::Busy => {}
            }
            if target.now_ms().saturating_sub(start) >= u64::from(timeout) {
                warn!("Flash operation still busy after {} ms", timeout);
                return Err(HostError::Timeout(timeout));
            }
        }
    }

    /// Run Init and return the flash description
    #[maybe_async]
    pub async fn identify<T: DebugTarget>(&mut self, target: &mut T) -> Result<FlashInfoRecord> {
        self.begin(target).await?;
        let result = self.identify_inner(target).await;
        self.finish(target, result).await
    }

    #[maybe_async]
    async fn identify_inner<T: DebugTarget>(&mut self, target: &mut T) -> Result<FlashInfoRecord> {
        let params = self.request(Command::Init, 0, 0, false);
        self.submit(target, params).await?;
        let mut raw = [0u8; core::mem::size_of::<FlashInfoRecord>()];
        target.read_memory(BUFFER_ADDR, &mut raw).await?;
        FlashInfoRecord::parse(&raw).ok_or(HostError::Failure(esio_core::error::STATUS_GENERIC_FAILURE))
    }

    /// Erase `count` sectors starting at flash address `addr`
    #[maybe_async]
    pub async fn erase<T: DebugTarget, P: BankProgress>(
        &mut self,
        target: &mut T,
        addr: u32,
        count: usize,
        use_4byte: bool,
        progress: &mut P,
    ) -> Result<()> {
        let len = count
            .checked_mul(SECTOR_SIZE as usize)
            .ok_or(HostError::AddressOverflow { addr, len: usize::MAX })?;
        Self::check_span(addr, len)?;
        self.begin(target).await?;
        let result = self.erase_inner(target, addr, count, use_4byte, progress).await;
        self.finish(target, result).await
    }

    #[maybe_async]
    async fn erase_inner<T: DebugTarget, P: BankProgress>(
        &mut self,
        target: &mut T,
        addr: u32,
        count: usize,
        use_4byte: bool,
        progress: &mut P,
    ) -> Result<()> {
        progress.erasing(count);
        for i in 0..count {
            let sector_addr = addr + i as u32 * SECTOR_SIZE;
            info!("Erasing sector at 0x{:08x}, size {} bytes", sector_addr, SECTOR_SIZE);
            let params = self.request(Command::Erase, sector_addr, SECTOR_SIZE as usize, use_4byte);
            self.submit(target, params).await?;
            target.keep_alive().await;
            progress.erase_progress(i + 1);
        }
        Ok(())
    }

    /// Program `data` at flash address `addr`
    #[maybe_async]
    pub async fn program<T: DebugTarget, P: BankProgress>(
        &mut self,
        target: &mut T,
        addr: u32,
        data: &[u8],
        use_4byte: bool,
        progress: &mut P,
    ) -> Result<()> {
        Self::check_span(addr, data.len())?;
        self.begin(target).await?;
        let result = self.program_inner(target, addr, data, use_4byte, progress).await;
        self.finish(target, result).await
    }

    #[maybe_async]
    async fn program_inner<T: DebugTarget, P: BankProgress>(
        &mut self,
        target: &mut T,
        addr: u32,
        data: &[u8],
        use_4byte: bool,
        progress: &mut P,
    ) -> Result<()> {
        progress.writing(data.len());
        let mut done = 0;
        for chunk in data.chunks(BUFFER_SIZE) {
            let chunk_addr = addr + done as u32;
            debug!("Writing {} bytes to 0x{:08x}", chunk.len(), chunk_addr);
            target.write_memory(BUFFER_ADDR, chunk).await?;
            let params = self.request(Command::Program, chunk_addr, chunk.len(), use_4byte);
            self.submit(target, params).await?;
            done += chunk.len();
            progress.write_progress(done);
        }
        Ok(())
    }

    /// Read flash at `addr` into `buf` through the resident program
    #[maybe_async]
    pub async fn read<T: DebugTarget, P: BankProgress>(
        &mut self,
        target: &mut T,
        addr: u32,
        buf: &mut [u8],
        use_4byte: bool,
        progress: &mut P,
    ) -> Result<()> {
        Self::check_span(addr, buf.len())?;
        self.begin(target).await?;
        let result = self.read_inner(target, addr, buf, use_4byte, progress).await;
        self.finish(target, result).await
    }

    #[maybe_async]
    async fn read_inner<T: DebugTarget, P: BankProgress>(
        &mut self,
        target: &mut T,
        addr: u32,
        buf: &mut [u8],
        use_4byte: bool,
        progress: &mut P,
    ) -> Result<()> {
        progress.reading(buf.len());
        let mut done = 0;
        for chunk in buf.chunks_mut(BUFFER_SIZE) {
            let chunk_addr = addr + done as u32;
            let params = self.request(Command::Read, chunk_addr, chunk.len(), use_4byte);
            self.submit(target, params).await?;
            target.read_memory(BUFFER_ADDR, chunk).await?;
            done += chunk.len();
            progress.read_progress(done);
        }
        Ok(())
    }
}

#[cfg(all(test, feature = "is_sync"))]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::test_support::MockTarget;
    use alloc::vec;

    fn sequencer() -> OperationSequencer {
        let config = SequencerConfig { timeout_ms: 100 };
        OperationSequencer::new(config, EngineKind::Fiu, vec![0xAA; 64], Port::Shd)
    }

    #[test]
    fn test_default_timeout() {
        assert_eq!(SequencerConfig::default().timeout_ms, 8000);
    }

    #[test]
    fn test_program_chunks_at_buffer_size() {
        let mut target = MockTarget::new();
        target.complete_with = Some(State::Idle);
        let mut seq = sequencer();
        let data = vec![0x5A; 5000];
        seq.program(&mut target, 0x1000, &data, false, &mut NoProgress).unwrap();

        let lengths: Vec<(u32, u32)> = target
            .submitted
            .iter()
            .map(|p| (p.address.get(), p.length.get()))
            .collect();
        assert_eq!(lengths, [(0x1000, 4096), (0x2000, 904)]);
        assert!(target.submitted.iter().all(|p| p.cmd == Command::Program as u8));
        assert_eq!(target.frees, 1);
    }

    #[test]
    fn test_submit_writes_idle_then_busy() {
        let mut target = MockTarget::new();
        target.complete_with = Some(State::Idle);
        let mut seq = sequencer();
        seq.identify(&mut target).unwrap();
        assert_eq!(target.state_writes, [State::Idle.code(), State::Busy.code()]);
    }

    #[test]
    fn test_timeout_still_tears_down() {
        let mut target = MockTarget::new();
        let mut seq = sequencer();
        let err = seq.erase(&mut target, 0, 4, false, &mut NoProgress).unwrap_err();
        assert_eq!(err, HostError::Timeout(100));
        // Gave up on the first poll at or past the bound, not before
        assert!((100..105).contains(&target.now), "waited {} ms", target.now);
        assert_eq!(target.submitted.len(), 1);
        assert_eq!(target.halts, 1);
        assert_eq!(target.frees, 1);
        assert!(seq.loader().session().is_none());
    }

    #[test]
    fn test_slow_request_against_bound() {
        let mut target = MockTarget::new();
        target.complete_with = Some(State::Idle);
        target.busy_polls = 50;
        let mut seq = OperationSequencer::new(
            SequencerConfig { timeout_ms: 0 },
            EngineKind::Fiu,
            vec![0xAA; 64],
            Port::Shd,
        );
        seq.identify(&mut target).unwrap();
        assert_eq!(target.now, 255);

        let mut target = MockTarget::new();
        target.complete_with = Some(State::Idle);
        target.busy_polls = 50;
        let err = sequencer().identify(&mut target).unwrap_err();
        assert_eq!(err, HostError::Timeout(100));
        assert_eq!(target.now, 100);
    }

    #[test]
    fn test_ranges_past_address_space_rejected() {
        let mut target = MockTarget::new();
        target.complete_with = Some(State::Idle);
        let mut seq = sequencer();

        let err = seq
            .erase(&mut target, 0xFFFF_F000, 2, false, &mut NoProgress)
            .unwrap_err();
        assert_eq!(err, HostError::AddressOverflow { addr: 0xFFFF_F000, len: 0x2000 });
        let err = seq
            .program(&mut target, 0xFFFF_FFF0, &[0; 32], false, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, HostError::AddressOverflow { .. }));
        let mut buf = [0u8; 17];
        let err = seq
            .read(&mut target, 0xFFFF_FFF0, &mut buf, true, &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, HostError::AddressOverflow { .. }));
        assert!(target.submitted.is_empty());
        assert_eq!(target.allocs, 0);

        // The last sector of the space is still reachable
        seq.erase(&mut target, 0xFFFF_F000, 1, true, &mut NoProgress).unwrap();
        assert_eq!(target.submitted[0].address.get(), 0xFFFF_F000);
    }

    #[test]
    fn test_failure_code_surfaces() {
        let mut target = MockTarget::new();
        target.complete_with = Some(State::Error(0xFD));
        let mut seq = sequencer();
        let err = seq.identify(&mut target).unwrap_err();
        assert_eq!(err, HostError::Failure(0xFD));
        assert_eq!(target.frees, 1);
    }

    #[test]
    fn test_misplaced_working_area() {
        let mut target = MockTarget::new();
        target.area_address = 0x2000_0000;
        let mut seq = sequencer();
        let err = seq.identify(&mut target).unwrap_err();
        assert!(matches!(err, HostError::ResourceUnavailable(_)));
        assert_eq!(target.frees, 1);
        assert_eq!(target.starts, 0);
    }
}
