//! Resident flash program for Nuvoton eSIO parts
//!
//! esioflash writes this image to the program region behind the mailbox
//! and starts the core at its first byte. The program then serves mailbox
//! requests until the host halts the core.
//!
//! One image is built per controller, selected by cargo feature:
//!
//! | Feature | Engine | Part |
//! |---------------|-------------|----------------------|
//! | `fiu`         | FIU         | NCT6694D             |
//! | `fiu-legacy`  | legacy FIU  | NCT6692D             |
//! | `spim`        | SPIM        | NCT6694D on-die flash |
//!
//! ```text
//! cargo build --release --no-default-features --features spim
//! arm-none-eabi-objcopy -O binary <elf> esio-spim.bin
//! ```

#![no_std]
#![no_main]

mod clock;

use core::arch::global_asm;
use core::panic::PanicInfo;

use esio_core::dispatcher::Dispatcher;
use esio_core::engine::EngineKind;
use esio_core::mailbox::RawMailbox;
use esio_core::mmio::MmioBus;

use crate::clock::DwtClock;

#[cfg(any(
    all(feature = "fiu", feature = "fiu-legacy"),
    all(feature = "fiu", feature = "spim"),
    all(feature = "fiu-legacy", feature = "spim"),
))]
compile_error!("select exactly one of the `fiu`, `fiu-legacy` and `spim` features");

#[cfg(not(any(feature = "fiu", feature = "fiu-legacy", feature = "spim")))]
compile_error!("select one of the `fiu`, `fiu-legacy` or `spim` features");

#[cfg(feature = "fiu")]
mod engine {
    pub use esio_core::engine::Fiu as Engine;
    pub const KIND: super::EngineKind = super::EngineKind::Fiu;
    pub const CORE_CLOCK_HZ: u32 = 96_000_000;
}

#[cfg(feature = "fiu-legacy")]
mod engine {
    pub use esio_core::engine::LegacyFiu as Engine;
    pub const KIND: super::EngineKind = super::EngineKind::LegacyFiu;
    pub const CORE_CLOCK_HZ: u32 = 48_000_000;
}

#[cfg(feature = "spim")]
mod engine {
    pub use esio_core::engine::Spim as Engine;
    pub const KIND: super::EngineKind = super::EngineKind::Spim;
    pub const CORE_CLOCK_HZ: u32 = 96_000_000;
}

/// Lets the host tell which controller an image drives
#[used]
#[link_section = ".rodata.esr_marker"]
static IMAGE_MARKER: [u8; 4] = [
    esio_core::engine::IMAGE_MAGIC[0],
    esio_core::engine::IMAGE_MAGIC[1],
    esio_core::engine::IMAGE_MAGIC[2],
    engine::KIND.tag(),
];

// Entry point: the debugger leaves sp undefined and bss uncleared
global_asm!(
    ".section .text.entry, \"ax\"",
    ".global _start",
    ".thumb_func",
    "_start:",
    "    ldr r0, =_estack",
    "    mov sp, r0",
    "    ldr r0, =_sbss",
    "    ldr r1, =_ebss",
    "    movs r2, #0",
    "1:",
    "    cmp r0, r1",
    "    bhs 2f",
    "    str r2, [r0], #4",
    "    b 1b",
    "2:",
    "    bl resident_main",
    "    bkpt #0",
    ".ltorg",
);

#[no_mangle]
extern "C" fn resident_main() -> ! {
    let clock = DwtClock::start(engine::CORE_CLOCK_HZ);
    // SAFETY: we are the only code running on the target
    let bus = unsafe { MmioBus::new(clock) };
    // SAFETY: the mailbox region is reserved for us by the host; only the
    // host writes it besides us, and RawMailbox never borrows it
    let mut mailbox = unsafe { RawMailbox::at_fixed_address() };

    let mut dispatcher = Dispatcher::new(engine::Engine::new(bus));
    dispatcher.start(&mut mailbox);
    dispatcher.run(&mut mailbox)
}

#[panic_handler]
fn panic(_info: &PanicInfo<'_>) -> ! {
    // Stop where the debugger can see it; the mailbox stays Busy and the
    // host times out
    loop {
        cortex_m::asm::bkpt();
    }
}
