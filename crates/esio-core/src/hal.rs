//! Hardware access capability
//!
//! Everything the flash algorithms do to the chip goes through
//! [`HardwareAccess`]: sized register reads and writes, block copies between
//! bus addresses and CPU-side buffers, and a time source for status polling.
//! The firmware binds it to real MMIO ([`crate::mmio::MmioBus`]); the
//! simulator binds it to register models.

use crate::regs::{GDMA_BURST_ALIGN_MASK, GDMA_BURST_CHUNK};

/// Monotonic time source used by status polling
pub trait Clock {
    /// Microseconds since an arbitrary epoch
    fn now_us(&mut self) -> u64;

    /// Busy-wait for at least `us` microseconds
    fn delay_us(&mut self, us: u32);
}

/// Register and memory access on the target bus
///
/// Addresses are 32-bit bus addresses. None of these operations can fail;
/// a bad address is a hang or a bus fault on real hardware.
pub trait HardwareAccess: Clock {
    /// Read an 8-bit register
    fn read8(&mut self, addr: u32) -> u8;
    /// Read a 16-bit register
    fn read16(&mut self, addr: u32) -> u16;
    /// Read a 32-bit register
    fn read32(&mut self, addr: u32) -> u32;
    /// Write an 8-bit register
    fn write8(&mut self, addr: u32, value: u8);
    /// Write a 16-bit register
    fn write16(&mut self, addr: u32, value: u16);
    /// Write a 32-bit register
    fn write32(&mut self, addr: u32, value: u32);

    /// Copy `buf.len()` bytes starting at bus address `src` into `buf`
    fn read_block(&mut self, src: u32, buf: &mut [u8]);

    /// Copy `data` to bus address `dst`
    fn write_block(&mut self, dst: u32, data: &[u8]);

    /// Bus address a DMA master can fetch `data` from
    ///
    /// On the target the slice already lives in SRAM. Other bindings may
    /// stage it first; the address stays valid until the next call.
    fn dma_source(&mut self, data: &[u8]) -> u32;

    /// Set bits in an 8-bit register
    fn set_bits8(&mut self, addr: u32, mask: u8) {
        let v = self.read8(addr);
        self.write8(addr, v | mask);
    }

    /// Clear bits in an 8-bit register
    fn clear_bits8(&mut self, addr: u32, mask: u8) {
        let v = self.read8(addr);
        self.write8(addr, v & !mask);
    }

    /// Replace the bits selected by `mask` in an 8-bit register
    fn modify8(&mut self, addr: u32, mask: u8, value: u8) {
        let v = self.read8(addr);
        self.write8(addr, (v & !mask) | (value & mask));
    }

    /// Set bits in a 32-bit register
    fn set_bits32(&mut self, addr: u32, mask: u32) {
        let v = self.read32(addr);
        self.write32(addr, v | mask);
    }

    /// Clear bits in a 32-bit register
    fn clear_bits32(&mut self, addr: u32, mask: u32) {
        let v = self.read32(addr);
        self.write32(addr, v & !mask);
    }
}

/// How a block copy is split between GDMA bursts and byte transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyPlan {
    /// Bytes moved with 16-byte bursts, a multiple of 64
    pub burst_len: usize,
    /// Bytes moved one at a time after the burst
    pub byte_len: usize,
}

/// Split a copy of `len` bytes from `src` to `dst`
///
/// Bursts require both ends 16-byte aligned and move `len & !63` bytes; the
/// remainder (or everything, when misaligned) goes byte by byte.
pub fn plan_block_copy(dst: u32, src: u32, len: usize) -> CopyPlan {
    let aligned = (dst | src) & GDMA_BURST_ALIGN_MASK == 0;
    let burst_len = if aligned {
        len & !(GDMA_BURST_CHUNK as usize - 1)
    } else {
        0
    };
    CopyPlan {
        burst_len,
        byte_len: len - burst_len,
    }
}

/// Poll `done` every `poll_us` until it returns true or `timeout_ms` elapses
///
/// A `timeout_ms` of zero waits forever. Returns false on timeout. The bound
/// is elapsed time on the clock, not an iteration count.
pub fn poll_until<H, F>(hw: &mut H, poll_us: u32, timeout_ms: u32, mut done: F) -> bool
where
    H: Clock + ?Sized,
    F: FnMut(&mut H) -> bool,
{
    let start = hw.now_us();
    let limit = u64::from(timeout_ms) * 1000;
    loop {
        if done(hw) {
            return true;
        }
        if timeout_ms != 0 && hw.now_us().saturating_sub(start) >= limit {
            return false;
        }
        hw.delay_us(poll_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestClock(u64);

    impl Clock for TestClock {
        fn now_us(&mut self) -> u64 {
            self.0
        }
        fn delay_us(&mut self, us: u32) {
            self.0 += u64::from(us);
        }
    }

    #[test]
    fn test_plan_aligned_copy_bursts_multiple_of_64() {
        let plan = plan_block_copy(0x200C_0014 & !0xF, 0x6000_0000, 4096 + 20);
        assert_eq!(plan.burst_len, 4096);
        assert_eq!(plan.byte_len, 20);
    }

    #[test]
    fn test_plan_misaligned_copy_is_bytewise() {
        // The mailbox buffer sits at 0x200C0014, which is only 4-byte aligned
        let plan = plan_block_copy(0x200C_0014, 0x6000_0000, 4096);
        assert_eq!(plan.burst_len, 0);
        assert_eq!(plan.byte_len, 4096);
    }

    #[test]
    fn test_plan_short_aligned_copy() {
        let plan = plan_block_copy(0x2000_0000, 0x6000_0040, 63);
        assert_eq!(plan, CopyPlan { burst_len: 0, byte_len: 63 });
    }

    #[test]
    fn test_poll_until_times_out_on_elapsed_time() {
        let mut clock = TestClock(0);
        let ok = poll_until(&mut clock, 50, 10, |_| false);
        assert!(!ok);
        assert!(clock.0 >= 10_000);
        assert!(clock.0 < 10_100);
    }

    #[test]
    fn test_poll_until_succeeds() {
        let mut clock = TestClock(0);
        let mut polls = 0;
        assert!(poll_until(&mut clock, 50, 0, |_| {
            polls += 1;
            polls == 3
        }));
        assert_eq!(clock.0, 100);
    }
}
