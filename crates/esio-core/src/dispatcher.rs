//! Resident mailbox state machine
//!
//! The dispatcher owns the target side of the mailbox. It spins while the
//! state byte is Idle, serves one request when the host flips it to Busy,
//! and writes back Idle on success or the error's status code on failure.
//! A failure is terminal: the dispatcher stops serving and only a reload of
//! the resident program brings it back.
//!
//! ```text
//!         host writes Busy           success
//!   Idle ------------------> Busy ------------> Idle
//!                             |
//!                             | failure
//!                             v
//!                        Error(code)   (halted)
//! ```

use log::{debug, warn};
use zerocopy::IntoBytes;

use crate::driver::{FlashDriver, FlashIdentity};
use crate::engine::{CommandEngine, EngineFeatures};
use crate::error::{Error, Result};
use crate::mailbox::{Command, Mailbox, MailboxParams, Port, State, BUFFER_SIZE};
use crate::spi::PAGE_SIZE;

/// Bytes moved between the mailbox buffer and the flash per driver call
const STAGE_SIZE: usize = PAGE_SIZE as usize;

/// Staging page, aligned for GDMA bursts out of the mapped windows
#[repr(align(16))]
struct Stage([u8; STAGE_SIZE]);

/// Outcome of one [`Dispatcher::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// No request pending
    Waiting,
    /// A request was served and the state set back to Idle
    Completed,
    /// A request failed; the state now holds this code
    Failed(u8),
    /// An earlier failure stopped the dispatcher
    Halted,
}

/// Serves mailbox requests with one engine
pub struct Dispatcher<E> {
    driver: FlashDriver<E>,
    halted: bool,
}

impl<E: CommandEngine> Dispatcher<E> {
    /// Dispatcher over `engine`
    pub fn new(engine: E) -> Self {
        Self {
            driver: FlashDriver::new(engine),
            halted: false,
        }
    }

    /// The flash driver
    pub fn driver(&mut self) -> &mut FlashDriver<E> {
        &mut self.driver
    }

    /// Release the engine
    pub fn into_engine(self) -> E {
        self.driver.into_inner()
    }

    /// Whether a failure has stopped request handling
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Controller setup, then zero the mailbox and publish Idle
    pub fn start<M: Mailbox>(&mut self, mb: &mut M) {
        self.driver.engine().start();
        mb.reset();
        self.halted = false;
        debug!("resident started on {}", self.driver.engine().kind());
    }

    /// Serve at most one request
    pub fn step<M: Mailbox>(&mut self, mb: &mut M) -> Step {
        if self.halted {
            return Step::Halted;
        }
        if mb.state() != State::Busy {
            return Step::Waiting;
        }

        // The header is read exactly once per request
        let params = mb.params();
        match self.serve(&params, mb) {
            Ok(()) => {
                mb.set_state(State::Idle);
                Step::Completed
            }
            Err(e) => {
                let code = e.status_code();
                warn!("request cmd {} port 0x{:02X} failed: {}", params.cmd, params.port, e);
                mb.set_state(State::Error(code));
                self.halted = true;
                Step::Failed(code)
            }
        }
    }

    /// Serve requests forever
    pub fn run<M: Mailbox>(&mut self, mb: &mut M) -> ! {
        loop {
            self.step(mb);
            core::hint::spin_loop();
        }
    }

    fn serve<M: Mailbox>(&mut self, params: &MailboxParams, mb: &mut M) -> Result<()> {
        let port = Port::try_from(params.port)?;
        if !self.driver.engine().supports_port(port) {
            return Err(Error::UnsupportedPort(params.port));
        }
        let cmd = Command::try_from(params.cmd)?;
        let addr = params.address.get();
        let len = params.length.get();
        let use_4byte = params.addr_4byte != 0;
        if len as usize > BUFFER_SIZE {
            return Err(Error::InvalidLength(len));
        }
        let len = len as usize;
        debug!("{:?} {} addr 0x{:08X} len {} 4B {}", cmd, port, addr, len, use_4byte);

        match cmd {
            Command::Init => {
                let ident = self.init(port)?;
                mb.write_buffer(0, ident.record().as_bytes());
                Ok(())
            }
            Command::Erase => {
                self.driver.port_init(port, false, use_4byte)?;
                self.driver.erase_sector(port, addr, use_4byte)
            }
            Command::Program => {
                self.driver.port_init(port, false, use_4byte)?;
                self.program(port, addr, len, use_4byte, mb)
            }
            Command::Read => {
                self.driver.port_init(port, false, use_4byte)?;
                self.read(port, addr, len, use_4byte, mb)
            }
            Command::Verify => Err(Error::UnsupportedCommand(params.cmd)),
        }
    }

    // Stages one flash page at a time so no chunk straddles a page boundary
    fn program<M: Mailbox>(&mut self, port: Port, addr: u32, len: usize, use_4byte: bool, mb: &mut M) -> Result<()> {
        let mut stage = Stage([0; STAGE_SIZE]);
        let mut done = 0;
        while done < len {
            let chunk_addr = addr.wrapping_add(done as u32);
            let to_boundary = (PAGE_SIZE - chunk_addr % PAGE_SIZE) as usize;
            let n = to_boundary.min(len - done);
            mb.read_buffer(done, &mut stage.0[..n]);
            self.driver
                .program_range(port, chunk_addr, &stage.0[..n], use_4byte)?;
            done += n;
        }
        Ok(())
    }

    fn read<M: Mailbox>(&mut self, port: Port, addr: u32, len: usize, use_4byte: bool, mb: &mut M) -> Result<()> {
        let mut stage = Stage([0; STAGE_SIZE]);
        let mut done = 0;
        while done < len {
            let n = STAGE_SIZE.min(len - done);
            self.driver
                .read_range(port, addr.wrapping_add(done as u32), &mut stage.0[..n], use_4byte)?;
            mb.write_buffer(done, &stage.0[..n]);
            done += n;
        }
        Ok(())
    }

    fn init(&mut self, port: Port) -> Result<FlashIdentity> {
        let engine = self.driver.engine();
        engine.open_port(port, false);
        if engine.features(port).contains(EngineFeatures::SFDP_INIT) {
            self.driver.discover_geometry(port)
        } else {
            self.driver.identify_checked(port).map(FlashIdentity::id_only)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::*;
    use crate::mailbox::{FlashInfoRecord, MemoryMailbox, PARAMS_SIZE, MAILBOX_REGION_SIZE};
    use crate::spi::opcodes;
    use crate::test_support::FakeEngine;
    use std::vec;
    use std::vec::Vec;

    type TestMailbox = MemoryMailbox<Vec<u8>>;

    fn setup() -> (Dispatcher<FakeEngine>, TestMailbox) {
        let mut mb = MemoryMailbox::new(vec![0xA5; MAILBOX_REGION_SIZE]).unwrap();
        let mut disp = Dispatcher::new(FakeEngine::new(64 * 1024));
        disp.start(&mut mb);
        (disp, mb)
    }

    fn submit(mb: &mut TestMailbox, params: MailboxParams) {
        mb.as_bytes_mut()[..PARAMS_SIZE].copy_from_slice(params.with_state(State::Busy).as_bytes());
    }

    fn request(cmd: Command, port: Port, addr: u32, len: u32) -> MailboxParams {
        MailboxParams::request(cmd, port, false, addr, len)
    }

    #[test]
    fn test_start_zeroes_mailbox() {
        let (_, mb) = setup();
        assert!(mb.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_idle_mailbox_is_left_alone() {
        let (mut disp, mut mb) = setup();
        assert_eq!(disp.step(&mut mb), Step::Waiting);
        assert!(disp.driver().engine().opcodes.is_empty());
    }

    #[test]
    fn test_single_transition_per_submission() {
        let (mut disp, mut mb) = setup();
        mb.buffer_mut()[..4].copy_from_slice(&[1, 2, 3, 4]);
        submit(&mut mb, request(Command::Program, Port::Pvt, 0x100, 4));

        assert_eq!(disp.step(&mut mb), Step::Completed);
        assert_eq!(mb.state(), State::Idle);
        let ops = disp.driver().engine().opcodes.len();

        // Nothing more happens until the host submits again
        assert_eq!(disp.step(&mut mb), Step::Waiting);
        assert_eq!(disp.driver().engine().opcodes.len(), ops);
        assert_eq!(disp.driver().engine().count(opcodes::PP), 1);
        assert_eq!(&disp.driver().engine().mem[0x100..0x104], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_init_reports_geometry() {
        let (mut disp, mut mb) = setup();
        submit(&mut mb, request(Command::Init, Port::Shd, 0, 0));
        assert_eq!(disp.step(&mut mb), Step::Completed);

        let record = FlashInfoRecord::parse(mb.buffer()).unwrap();
        assert_eq!(record, FlashInfoRecord::new(0xEF4014, 64 * 1024, false));
        assert_eq!(disp.driver().engine().opened, [Port::Shd]);
    }

    #[test]
    fn test_init_id_only() {
        let (mut disp, mut mb) = setup();
        disp.driver().engine().features = EngineFeatures::MAPPED_READ;
        submit(&mut mb, request(Command::Init, Port::Pvt, 0, 0));
        assert_eq!(disp.step(&mut mb), Step::Completed);

        let record = FlashInfoRecord::parse(mb.buffer()).unwrap();
        assert_eq!(record, FlashInfoRecord::new(0xEF4014, 0, false));
        assert_eq!(disp.driver().engine().count(opcodes::RDSFDP), 0);
    }

    #[test]
    fn test_init_floating_id_halts() {
        let (mut disp, mut mb) = setup();
        disp.driver().engine().features = EngineFeatures::empty();
        disp.driver().engine().id = [0xFF; 3];
        submit(&mut mb, request(Command::Init, Port::Pvt, 0, 0));
        assert_eq!(disp.step(&mut mb), Step::Failed(STATUS_BAD_JEDEC_ID));
        assert_eq!(mb.state(), State::Error(STATUS_BAD_JEDEC_ID));

        // Terminal: a new submission is not served
        submit(&mut mb, request(Command::Init, Port::Pvt, 0, 0));
        assert_eq!(disp.step(&mut mb), Step::Halted);
        assert!(disp.is_halted());
        assert_eq!(mb.state(), State::Busy);
    }

    #[test]
    fn test_rejects_bad_port_codes() {
        let (mut disp, mut mb) = setup();
        let mut params = request(Command::Read, Port::Pvt, 0, 4);
        params.port = 7;
        submit(&mut mb, params);
        assert_eq!(disp.step(&mut mb), Step::Failed(STATUS_INVALID_PORT));

        let (mut disp, mut mb) = setup();
        submit(&mut mb, request(Command::Read, Port::Internal, 0, 4));
        assert_eq!(disp.step(&mut mb), Step::Failed(STATUS_GENERIC_FAILURE));
        assert!(disp.driver().engine().opcodes.is_empty());
    }

    #[test]
    fn test_rejects_oversized_length() {
        let (mut disp, mut mb) = setup();
        submit(&mut mb, request(Command::Program, Port::Pvt, 0, BUFFER_SIZE as u32 + 1));
        assert_eq!(disp.step(&mut mb), Step::Failed(STATUS_INVALID_LENGTH));
    }

    #[test]
    fn test_verify_and_unknown_commands_fail() {
        let (mut disp, mut mb) = setup();
        submit(&mut mb, request(Command::Verify, Port::Pvt, 0, 0));
        assert_eq!(disp.step(&mut mb), Step::Failed(STATUS_GENERIC_FAILURE));

        let (mut disp, mut mb) = setup();
        let mut params = request(Command::Init, Port::Pvt, 0, 0);
        params.cmd = 9;
        submit(&mut mb, params);
        assert_eq!(disp.step(&mut mb), Step::Failed(STATUS_GENERIC_FAILURE));
    }

    #[test]
    fn test_erase_timeout_reports_code() {
        let (mut disp, mut mb) = setup();
        disp.driver().engine().stuck_busy = true;
        submit(&mut mb, request(Command::Erase, Port::Pvt, 0x3000, 0));
        assert_eq!(disp.step(&mut mb), Step::Failed(STATUS_TIMEOUT));
    }

    #[test]
    fn test_read_fills_buffer() {
        let (mut disp, mut mb) = setup();
        disp.driver().engine().mem[0x2000..0x2008].copy_from_slice(b"resident");
        submit(&mut mb, request(Command::Read, Port::Bkp, 0x2000, 8));
        assert_eq!(disp.step(&mut mb), Step::Completed);
        assert_eq!(&mb.buffer()[..8], b"resident");
        assert_eq!(&mb.buffer()[8..12], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_long_transfers_cross_page_boundaries() {
        let (mut disp, mut mb) = setup();
        let data: Vec<u8> = (0..600).map(|i| (i * 13) as u8).collect();
        mb.buffer_mut()[..600].copy_from_slice(&data);
        submit(&mut mb, request(Command::Program, Port::Shd, 0x1F0, 600));
        assert_eq!(disp.step(&mut mb), Step::Completed);
        assert_eq!(disp.driver().engine().count(opcodes::PP), 4);
        assert_eq!(&disp.driver().engine().mem[0x1F0..0x1F0 + 600], &data[..]);

        mb.buffer_mut().fill(0);
        submit(&mut mb, request(Command::Read, Port::Shd, 0x1F0, 600));
        assert_eq!(disp.step(&mut mb), Step::Completed);
        assert_eq!(&mb.buffer()[..600], &data[..]);
    }
}
