//! Time source from the DWT cycle counter

use cortex_m::peripheral::{DWT, Peripherals};
use esio_core::hal::Clock;

/// Microsecond clock over `CYCCNT`
///
/// The 32-bit counter wraps every few tens of seconds; wraps are folded into
/// a 64-bit total on every read, which status polling does far more often.
pub struct DwtClock {
    cycles_per_us: u32,
    last: u32,
    total: u64,
}

impl DwtClock {
    /// Enable the cycle counter and start counting from now
    pub fn start(core_hz: u32) -> Self {
        // SAFETY: nothing else on the target owns the core peripherals
        let mut cp = unsafe { Peripherals::steal() };
        cp.DCB.enable_trace();
        cp.DWT.enable_cycle_counter();

        Self {
            cycles_per_us: core_hz / 1_000_000,
            last: DWT::cycle_count(),
            total: 0,
        }
    }
}

impl Clock for DwtClock {
    fn now_us(&mut self) -> u64 {
        let now = DWT::cycle_count();
        self.total += u64::from(now.wrapping_sub(self.last));
        self.last = now;
        self.total / u64::from(self.cycles_per_us)
    }

    fn delay_us(&mut self, us: u32) {
        let end = self.now_us() + u64::from(us);
        while self.now_us() < end {
            core::hint::spin_loop();
        }
    }
}
