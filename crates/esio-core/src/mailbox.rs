//! Mailbox contract shared by the host and the resident program
//!
//! The host and the resident program talk through a fixed block of target
//! RAM: a 20-byte parameter header, a 4096-byte data buffer, then the
//! resident image itself.
//!
//! ```text
//! 0x200C0000  MailboxParams (20 bytes)
//! 0x200C0014  data buffer   (4096 bytes)
//! 0x200C1014  resident image (up to 4096 bytes)
//! ```
//!
//! All multi-byte fields are little-endian. Only `state` is written after a
//! request is submitted, and only by whichever side currently owns the turn.

use core::sync::atomic::{compiler_fence, Ordering};

use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{Error, Result};

// ============================================================================
// Layout
// ============================================================================

/// Address of [`MailboxParams`] in target RAM
pub const MAILBOX_ADDR: u32 = 0x200C_0000;
/// Size of [`MailboxParams`]
pub const PARAMS_SIZE: usize = 0x14;
/// Address of the data buffer
pub const BUFFER_ADDR: u32 = MAILBOX_ADDR + PARAMS_SIZE as u32;
/// Size of the data buffer
pub const BUFFER_SIZE: usize = 0x1000;
/// Address the resident image is loaded at and started from
pub const PROGRAM_ADDR: u32 = BUFFER_ADDR + BUFFER_SIZE as u32;
/// Space reserved for the resident image
pub const PROGRAM_SIZE: usize = 0x1000;
/// Working area the host allocates for params, buffer and image
pub const WORKING_AREA_SIZE: usize = PARAMS_SIZE + BUFFER_SIZE + PROGRAM_SIZE;
/// Params plus buffer, the part of the working area the dispatcher owns
pub const MAILBOX_REGION_SIZE: usize = PARAMS_SIZE + BUFFER_SIZE;

/// Byte offset of `state` inside [`MailboxParams`]
pub const STATE_OFFSET: usize = 0;

// ============================================================================
// Codes
// ============================================================================

/// Mailbox state byte
///
/// Any value other than Idle or Busy is a terminal failure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Waiting for work, or the last request succeeded
    Idle,
    /// A request is pending or executing
    Busy,
    /// The last request failed with this status code
    Error(u8),
}

impl State {
    /// Raw state byte
    pub const fn code(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Busy => 1,
            Self::Error(code) => *code,
        }
    }

    /// Decode a raw state byte
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Idle,
            1 => Self::Busy,
            other => Self::Error(other),
        }
    }
}

/// Request code in [`MailboxParams::cmd`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Identify the flash and report geometry
    Init = 0,
    /// Erase one 4 KiB sector
    Erase = 1,
    /// Program `length` bytes from the buffer
    Program = 2,
    /// Read `length` bytes into the buffer
    Read = 3,
    /// Reserved; the resident rejects it and the host verifies by reading back
    Verify = 4,
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Init),
            1 => Ok(Self::Erase),
            2 => Ok(Self::Program),
            3 => Ok(Self::Read),
            4 => Ok(Self::Verify),
            other => Err(Error::UnsupportedCommand(other)),
        }
    }
}

/// Flash port selector in [`MailboxParams::port`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    /// Private flash (CS0)
    Pvt,
    /// Shared flash (CS1)
    Shd,
    /// Backup flash (CS2)
    Bkp,
    /// On-die flash behind the SPIM
    Internal,
}

impl Port {
    /// Raw port code
    pub const fn code(&self) -> u8 {
        match self {
            Self::Pvt => 0,
            Self::Shd => 1,
            Self::Bkp => 2,
            Self::Internal => 0xFF,
        }
    }

    /// Index of an external port (0 = PVT, 1 = SHD, 2 = BKP)
    pub const fn index(&self) -> Option<u8> {
        match self {
            Self::Internal => None,
            other => Some(other.code()),
        }
    }
}

impl TryFrom<u8> for Port {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Pvt),
            1 => Ok(Self::Shd),
            2 => Ok(Self::Bkp),
            0xFF => Ok(Self::Internal),
            other => Err(Error::InvalidPort(other)),
        }
    }
}

impl core::fmt::Display for Port {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Pvt => "PVT",
            Self::Shd => "SHD",
            Self::Bkp => "BKP",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Records
// ============================================================================

/// Request header at [`MAILBOX_ADDR`]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
#[repr(C)]
pub struct MailboxParams {
    /// State byte, see [`State`]
    pub state: u8,
    /// Request code, see [`Command`]
    pub cmd: u8,
    /// Port code, see [`Port`]
    pub port: u8,
    /// Nonzero when the flash is addressed with 4 bytes
    pub addr_4byte: u8,
    /// Loader version, informational
    pub version: U32,
    /// Flash address of the request
    pub address: U32,
    /// Byte count of the request
    pub length: U32,
    /// Unused
    pub reserved: U32,
}

impl MailboxParams {
    /// Build a request header in the Idle state
    pub fn request(cmd: Command, port: Port, addr_4byte: bool, address: u32, length: u32) -> Self {
        Self {
            state: State::Idle.code(),
            cmd: cmd as u8,
            port: port.code(),
            addr_4byte: addr_4byte as u8,
            version: U32::new(0),
            address: U32::new(address),
            length: U32::new(length),
            reserved: U32::new(0),
        }
    }

    /// Same header with a different state byte
    pub fn with_state(mut self, state: State) -> Self {
        self.state = state.code();
        self
    }

    /// Decode a header from the start of `bytes`
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        Self::read_from_prefix(bytes).ok().map(|(params, _)| params)
    }
}

/// Init response written at the start of the data buffer
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
#[repr(C)]
pub struct FlashInfoRecord {
    /// JEDEC id, `mfr << 16 | type << 8 | capacity`
    pub id: U32,
    /// Capacity in bytes, zero when only the id was read
    pub size: U32,
    /// Nonzero when the flash needs 4-byte addressing
    pub addr_4byte: u8,
}

impl FlashInfoRecord {
    /// Build a record
    pub fn new(id: u32, size: u32, addr_4byte: bool) -> Self {
        Self {
            id: U32::new(id),
            size: U32::new(size),
            addr_4byte: addr_4byte as u8,
        }
    }

    /// Decode a record from the start of the data buffer
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        Self::read_from_prefix(bytes).ok().map(|(record, _)| record)
    }
}

// ============================================================================
// Resident-side access
// ============================================================================

/// The resident program's view of the mailbox
pub trait Mailbox {
    /// Current state byte, read fresh every call
    fn state(&mut self) -> State;

    /// Publish a new state byte
    fn set_state(&mut self, state: State);

    /// Snapshot of the request header
    fn params(&mut self) -> MailboxParams;

    /// Copy out of the data buffer starting at `offset`
    ///
    /// Bytes past the end of the buffer are left untouched in `buf`.
    fn read_buffer(&mut self, offset: usize, buf: &mut [u8]);

    /// Copy `data` into the data buffer starting at `offset`, clipped to the
    /// buffer
    fn write_buffer(&mut self, offset: usize, data: &[u8]);

    /// Zero params and buffer and leave the state Idle
    fn reset(&mut self);
}

/// Bytes of the buffer available from `offset` for a transfer of `len`
fn buffer_span(offset: usize, len: usize) -> usize {
    len.min(BUFFER_SIZE.saturating_sub(offset))
}

/// [`Mailbox`] over a plain byte region holding params followed by buffer
///
/// Backed by an owned `Vec<u8>` in tests and by a borrowed RAM slice in the
/// simulator, where nothing else writes the region while it is borrowed.
pub struct MemoryMailbox<M> {
    mem: M,
}

impl<M: AsRef<[u8]> + AsMut<[u8]>> MemoryMailbox<M> {
    /// Wrap a region of at least [`MAILBOX_REGION_SIZE`] bytes
    pub fn new(mem: M) -> Result<Self> {
        if mem.as_ref().len() < MAILBOX_REGION_SIZE {
            return Err(Error::InvalidLength(mem.as_ref().len() as u32));
        }
        Ok(Self { mem })
    }

    /// Raw bytes of params followed by buffer
    pub fn as_bytes(&self) -> &[u8] {
        &self.mem.as_ref()[..MAILBOX_REGION_SIZE]
    }

    /// Mutable raw bytes of params followed by buffer
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mem.as_mut()[..MAILBOX_REGION_SIZE]
    }

    /// The data buffer
    pub fn buffer(&self) -> &[u8] {
        &self.as_bytes()[PARAMS_SIZE..]
    }

    /// The data buffer, mutably
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.as_bytes_mut()[PARAMS_SIZE..]
    }
}

impl<M: AsRef<[u8]> + AsMut<[u8]>> Mailbox for MemoryMailbox<M> {
    fn state(&mut self) -> State {
        State::from_code(self.mem.as_ref()[STATE_OFFSET])
    }

    fn set_state(&mut self, state: State) {
        self.mem.as_mut()[STATE_OFFSET] = state.code();
    }

    fn params(&mut self) -> MailboxParams {
        MailboxParams::parse(self.mem.as_ref()).unwrap_or_default()
    }

    fn read_buffer(&mut self, offset: usize, buf: &mut [u8]) {
        let n = buffer_span(offset, buf.len());
        buf[..n].copy_from_slice(&self.buffer()[offset..offset + n]);
    }

    fn write_buffer(&mut self, offset: usize, data: &[u8]) {
        let n = buffer_span(offset, data.len());
        self.buffer_mut()[offset..offset + n].copy_from_slice(&data[..n]);
    }

    fn reset(&mut self) {
        self.mem.as_mut()[..MAILBOX_REGION_SIZE].fill(0);
        self.set_state(State::Idle);
    }
}

/// [`Mailbox`] in target RAM that the host rewrites through the debug port
///
/// The region is never borrowed as a Rust reference. Every access is a
/// volatile read or write through the raw base pointer, so values the host
/// stores between two requests are always observed.
pub struct RawMailbox {
    base: *mut u8,
}

impl RawMailbox {
    /// Mailbox over `base`
    ///
    /// # Safety
    ///
    /// `base` must be valid for volatile reads and writes of
    /// [`MAILBOX_REGION_SIZE`] bytes for as long as the mailbox is used, and
    /// no Rust reference to that memory may exist meanwhile.
    pub unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }

    /// Mailbox at [`MAILBOX_ADDR`]
    ///
    /// # Safety
    ///
    /// Only valid on the target, and only one instance may exist.
    pub unsafe fn at_fixed_address() -> Self {
        Self::new(MAILBOX_ADDR as usize as *mut u8)
    }

    fn load(&self, off: usize) -> u8 {
        // SAFETY: callers keep off below MAILBOX_REGION_SIZE; validity of the
        // region is the constructor's contract
        unsafe { core::ptr::read_volatile(self.base.add(off)) }
    }

    fn store(&mut self, off: usize, value: u8) {
        // SAFETY: as for load
        unsafe { core::ptr::write_volatile(self.base.add(off), value) }
    }
}

impl Mailbox for RawMailbox {
    fn state(&mut self) -> State {
        let code = self.load(STATE_OFFSET);
        compiler_fence(Ordering::Acquire);
        State::from_code(code)
    }

    fn set_state(&mut self, state: State) {
        compiler_fence(Ordering::Release);
        self.store(STATE_OFFSET, state.code());
    }

    fn params(&mut self) -> MailboxParams {
        // SAFETY: MailboxParams is Unaligned and valid for any bit pattern,
        // and the header lies inside the region
        let params = unsafe { core::ptr::read_volatile(self.base as *const MailboxParams) };
        compiler_fence(Ordering::Acquire);
        params
    }

    fn read_buffer(&mut self, offset: usize, buf: &mut [u8]) {
        let n = buffer_span(offset, buf.len());
        for (i, b) in buf[..n].iter_mut().enumerate() {
            *b = self.load(PARAMS_SIZE + offset + i);
        }
    }

    fn write_buffer(&mut self, offset: usize, data: &[u8]) {
        let n = buffer_span(offset, data.len());
        for (i, &b) in data[..n].iter().enumerate() {
            self.store(PARAMS_SIZE + offset + i, b);
        }
    }

    fn reset(&mut self) {
        for off in 0..MAILBOX_REGION_SIZE {
            self.store(off, 0);
        }
        self.set_state(State::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_layout_offsets() {
        let p = MailboxParams::request(Command::Program, Port::Shd, true, 0x0012_3456, 0x1000)
            .with_state(State::Busy);
        let bytes = p.as_bytes();
        assert_eq!(bytes.len(), PARAMS_SIZE);
        assert_eq!(bytes[0], 1); // state
        assert_eq!(bytes[1], 2); // cmd
        assert_eq!(bytes[2], 1); // port
        assert_eq!(bytes[3], 1); // addr_4byte
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[0x56, 0x34, 0x12, 0x00]);
        assert_eq!(&bytes[12..16], &[0x00, 0x10, 0x00, 0x00]);
        assert_eq!(MailboxParams::parse(bytes), Some(p));
    }

    #[test]
    fn test_region_addresses() {
        assert_eq!(BUFFER_ADDR, 0x200C_0014);
        assert_eq!(PROGRAM_ADDR, 0x200C_1014);
        assert_eq!(WORKING_AREA_SIZE, 0x2014);
    }

    #[test]
    fn test_flash_info_record_layout() {
        let r = FlashInfoRecord::new(0x00EF_4014, 0x10_0000, false);
        assert_eq!(
            r.as_bytes(),
            &[0x14, 0x40, 0xEF, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00]
        );
        assert_eq!(FlashInfoRecord::parse(r.as_bytes()), Some(r));
    }

    #[test]
    fn test_codes() {
        assert_eq!(Port::try_from(0xFF), Ok(Port::Internal));
        assert_eq!(Port::try_from(3), Err(Error::InvalidPort(3)));
        assert_eq!(Command::try_from(7), Err(Error::UnsupportedCommand(7)));
        assert_eq!(State::from_code(0xFE), State::Error(0xFE));
    }

    #[test]
    fn test_raw_mailbox_reads_what_the_host_wrote() {
        let mut ram = std::vec![0xAAu8; MAILBOX_REGION_SIZE];
        let base = ram.as_mut_ptr();
        // SAFETY: ram outlives mb and is only touched through base below
        let mut mb = unsafe { RawMailbox::new(base) };
        mb.reset();
        assert_eq!(mb.state(), State::Idle);
        assert_eq!(mb.params(), MailboxParams::default());

        // Host side: header and data written behind the mailbox's back
        let request =
            MailboxParams::request(Command::Program, Port::Bkp, false, 0x4000, 3).with_state(State::Busy);
        for (i, &b) in request.as_bytes().iter().enumerate() {
            unsafe { base.add(i).write(b) };
        }
        for (i, b) in [7u8, 8, 9].into_iter().enumerate() {
            unsafe { base.add(PARAMS_SIZE + i).write(b) };
        }

        assert_eq!(mb.state(), State::Busy);
        assert_eq!(mb.params(), request);
        let mut data = [0u8; 3];
        mb.read_buffer(0, &mut data);
        assert_eq!(data, [7, 8, 9]);

        mb.write_buffer(BUFFER_SIZE - 2, &[1, 2, 3]);
        mb.set_state(State::Error(0xFE));
        assert_eq!(ram[0], 0xFE);
        assert_eq!(&ram[MAILBOX_REGION_SIZE - 2..], &[1, 2]);
    }

    #[test]
    fn test_memory_mailbox_reset_and_buffer() {
        let mut mb = MemoryMailbox::new([0xAAu8; MAILBOX_REGION_SIZE]).unwrap();
        mb.reset();
        assert_eq!(mb.state(), State::Idle);
        assert!(mb.as_bytes().iter().all(|&b| b == 0));
        assert_eq!(mb.buffer().len(), BUFFER_SIZE);
        mb.set_state(State::Busy);
        assert_eq!(mb.params().state, 1);
    }
}
