//! esioflash - Nuvoton eSIO SPI flash programmer
//!
//! Programs the flash behind an eSIO (NCT6692D / NCT6694D families) by
//! downloading a small resident program into the part's RAM and talking to
//! it through a mailbox over the debug port.
//!
//! # Architecture
//!
//! - **esio-core** - the resident side: engines for the FIU, legacy FIU and
//!   SPIM controllers, the flash driver and the mailbox dispatcher
//! - **esio-host** - the host side: loader, request sequencer and flash bank
//! - **esio-sim** - a simulated eSIO used as the debug target
//!
//! Bank commands need `--chip` and `--base`; the base address selects the
//! flash port and with it the resident image.

mod cli;
mod commands;
mod target;

use clap::Parser;
use cli::{Cli, Commands};
use esio_host::{BankConfig, ChipDatabase, FlashBank, ImageDir, SequencerConfig};
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let db = match load_chip_database(cli.chip_db.as_deref()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to load chip database: {}", e);
            std::process::exit(1);
        }
    };
    log::debug!("Loaded {} chip definitions", db.len());

    if let Commands::ListChips { series } = &cli.command {
        commands::list_chips(&db, series.as_deref());
        return Ok(());
    }

    let mut bank = open_bank(&cli, &db)?;
    let mut target = target::open_target(&cli.sim, &bank)?;

    match cli.command {
        Commands::Probe => commands::probe::run_probe(&mut bank, &mut target),
        Commands::Info => commands::probe::run_info(&mut bank, &mut target),
        Commands::Read { output, start, length } => {
            commands::read::run_read(&mut bank, &mut target, &output, start, length)
        }
        Commands::Write {
            input,
            start,
            verify,
            no_erase,
        } => commands::write::run_write(&mut bank, &mut target, &input, start, verify, no_erase),
        Commands::Erase { start, length } => commands::erase::run_erase(&mut bank, &mut target, start, length),
        Commands::Verify { input, start } => commands::verify::run_verify(&mut bank, &mut target, &input, start),
        Commands::ListChips { .. } => Ok(()),
    }
}

/// Built-in parts, plus any defined in `path`
fn load_chip_database(path: Option<&Path>) -> Result<ChipDatabase, Box<dyn std::error::Error>> {
    let mut db = ChipDatabase::builtin();
    if let Some(path) = path {
        if !path.is_file() {
            return Err(format!("Chip database file not found: {}", path.display()).into());
        }
        let count = db.load_ron_file(path)?;
        log::info!("Loaded {} chips from {}", count, path.display());
    }
    Ok(db)
}

/// Resolve `--chip`/`--base` and pick the resident images
fn open_bank(cli: &Cli, db: &ChipDatabase) -> Result<FlashBank, Box<dyn std::error::Error>> {
    let chip = cli.chip.clone().ok_or("--chip is required (see list-chips)")?;
    let base = cli.base.ok_or("--base is required")?;
    let config = BankConfig { base, chip };
    let sequencer = SequencerConfig {
        timeout_ms: cli.timeout_ms,
    };

    let bank = match &cli.images {
        Some(dir) => FlashBank::new(&config, db, &ImageDir::new(dir), sequencer)?,
        None => FlashBank::new(&config, db, &esio_sim::sim_images(), sequencer)?,
    };
    log::debug!(
        "Bank 0x{:08X}: {} port, {} engine",
        base,
        bank.selection().port,
        bank.selection().engine
    );
    Ok(bank)
}
