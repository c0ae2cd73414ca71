//! Memory-mapped binding of [`HardwareAccess`] for code running on the target
//!
//! # Safety
//!
//! Register addresses are dereferenced directly. This binding is only sound
//! inside the resident program on an eSIO part, where every address the
//! engines use is a valid peripheral or SRAM location.

use core::sync::atomic::{compiler_fence, Ordering};

use crate::hal::{plan_block_copy, Clock, HardwareAccess};
use crate::regs::*;

/// Volatile pointer access plus GDMA block copies
pub struct MmioBus<C> {
    clock: C,
}

impl<C: Clock> MmioBus<C> {
    /// Create a bus binding using `clock` for delays
    ///
    /// # Safety
    ///
    /// Must only be constructed on the target itself.
    pub unsafe fn new(clock: C) -> Self {
        Self { clock }
    }

    fn gdma_run(&mut self, dst: u32, src: u32, count: u32, ctl: u32) {
        self.write32(GDMA_BASE + GDMA_SRCB0, src);
        self.write32(GDMA_BASE + GDMA_DSTB0, dst);
        self.write32(GDMA_BASE + GDMA_TCNT0, count);
        self.write32(GDMA_BASE + GDMA_CTL0, ctl);
        while self.read32(GDMA_BASE + GDMA_CTL0) & GDMA_CTL_GDMAEN != 0 {}
        self.write32(GDMA_BASE + GDMA_CTL0, 0);
    }

    /// Copy `len` bytes with GDMA channel 0
    fn gdma_copy(&mut self, dst: u32, src: u32, len: usize) {
        let plan = plan_block_copy(dst, src, len);
        if plan.burst_len > 0 {
            self.write8(FIU_BASE + FIU_BURST_CFG, BURST_CFG_GDMA);
            self.gdma_run(dst, src, plan.burst_len as u32 / GDMA_BURST_UNIT, GDMA_CTL_BURST);
            self.write8(FIU_BASE + FIU_BURST_CFG, BURST_CFG_DEFAULT);
        }
        if plan.byte_len > 0 {
            let off = plan.burst_len as u32;
            self.gdma_run(dst + off, src + off, plan.byte_len as u32, GDMA_CTL_BYTE);
        }
        // The DMA engine wrote memory the compiler cannot see
        compiler_fence(Ordering::SeqCst);
    }
}

impl<C: Clock> Clock for MmioBus<C> {
    fn now_us(&mut self) -> u64 {
        self.clock.now_us()
    }

    fn delay_us(&mut self, us: u32) {
        self.clock.delay_us(us)
    }
}

impl<C: Clock> HardwareAccess for MmioBus<C> {
    fn read8(&mut self, addr: u32) -> u8 {
        // SAFETY: see module docs
        unsafe { core::ptr::read_volatile(addr as usize as *const u8) }
    }

    fn read16(&mut self, addr: u32) -> u16 {
        // SAFETY: see module docs
        unsafe { core::ptr::read_volatile(addr as usize as *const u16) }
    }

    fn read32(&mut self, addr: u32) -> u32 {
        // SAFETY: see module docs
        unsafe { core::ptr::read_volatile(addr as usize as *const u32) }
    }

    fn write8(&mut self, addr: u32, value: u8) {
        // SAFETY: see module docs
        unsafe { core::ptr::write_volatile(addr as usize as *mut u8, value) }
    }

    fn write16(&mut self, addr: u32, value: u16) {
        // SAFETY: see module docs
        unsafe { core::ptr::write_volatile(addr as usize as *mut u16, value) }
    }

    fn write32(&mut self, addr: u32, value: u32) {
        // SAFETY: see module docs
        unsafe { core::ptr::write_volatile(addr as usize as *mut u32, value) }
    }

    fn read_block(&mut self, src: u32, buf: &mut [u8]) {
        let dst = buf.as_mut_ptr() as usize as u32;
        self.gdma_copy(dst, src, buf.len());
    }

    fn write_block(&mut self, dst: u32, data: &[u8]) {
        let src = data.as_ptr() as usize as u32;
        self.gdma_copy(dst, src, data.len());
    }

    fn dma_source(&mut self, data: &[u8]) -> u32 {
        data.as_ptr() as usize as u32
    }
}
