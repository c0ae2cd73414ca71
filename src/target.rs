//! Debug target setup
//!
//! The only [`DebugTarget`](esio_host::DebugTarget) shipped in the workspace
//! is the simulated eSIO. Its flash defaults follow the bank: on-chip banks
//! get the part's own flash id and size, external banks a 16 MiB part.

use esio_core::mailbox::Port;
use esio_host::FlashBank;
use esio_sim::{SimConfig, SimTarget, SpiNorConfig};

use crate::cli::SimArgs;

/// JEDEC id of the default external part (Winbond W25Q128)
const DEFAULT_EXTERNAL_ID: u32 = 0xEF4018;
/// Size of the default external part
const DEFAULT_EXTERNAL_SIZE: u32 = 16 * 1024 * 1024;

/// Flash part the simulated board carries for `bank`
pub fn sim_flash(args: &SimArgs, bank: &FlashBank) -> (Port, SpiNorConfig) {
    let selection = bank.selection();
    let chip = bank.chip();
    let port = args.sim_port.unwrap_or(selection.port);
    let (id, size) = if selection.on_chip {
        (chip.id, chip.size)
    } else {
        (DEFAULT_EXTERNAL_ID, DEFAULT_EXTERNAL_SIZE)
    };

    let mut flash = SpiNorConfig::new(args.sim_id.unwrap_or(id), args.sim_size.unwrap_or(size));
    if args.sim_no_sfdp {
        flash = flash.without_sfdp();
    }
    if let Some(addr) = args.sim_stuck_erase {
        flash = flash.with_stuck_erase(addr);
    }
    (port, flash)
}

/// Build the simulated target for `bank`
pub fn open_target(args: &SimArgs, bank: &FlashBank) -> Result<SimTarget, Box<dyn std::error::Error>> {
    let (port, flash) = sim_flash(args, bank);
    log::info!(
        "Using simulated {} with flash 0x{:06X} ({} bytes) on {}",
        bank.chip().series,
        flash.id,
        flash.size,
        port
    );
    let size = flash.size as usize;
    let mut target = SimTarget::new(SimConfig::new(bank.chip().series).with_flash(port, flash));

    if let Some(path) = &args.sim_load {
        let contents = std::fs::read(path)?;
        if contents.len() > size {
            return Err(format!(
                "{:?} is {} bytes, simulated flash holds {}",
                path,
                contents.len(),
                size
            )
            .into());
        }
        if let Some(part) = target.flash(port) {
            part.data_mut()[..contents.len()].copy_from_slice(&contents);
        }
        log::debug!("Preloaded {} bytes from {:?}", contents.len(), path);
    }
    Ok(target)
}
