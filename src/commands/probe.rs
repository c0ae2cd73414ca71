//! Probe and info command implementation

use esio_host::{DebugTarget, FlashBank};

/// Probe the bank and print what answered
pub fn run_probe<T: DebugTarget>(bank: &mut FlashBank, target: &mut T) -> Result<(), Box<dyn std::error::Error>> {
    match bank.probe(target) {
        Ok(()) => {
            println!("{}", bank.info());
            Ok(())
        }
        Err(e) => {
            eprintln!("Probe failed: {}", e);
            Err(Box::new(e))
        }
    }
}

/// Probe if needed, then print bank and flash details
pub fn run_info<T: DebugTarget>(bank: &mut FlashBank, target: &mut T) -> Result<(), Box<dyn std::error::Error>> {
    bank.auto_probe(target)?;
    let chip = bank.chip();
    let selection = bank.selection();

    println!("eSIO Flash Bank Information");
    println!("===========================");
    println!();
    println!("Chip:            {} ({})", chip.name, chip.series);
    println!("Base:            0x{:08X}", bank.base());
    println!("Port:            {}", selection.port);
    println!("Engine:          {}", selection.engine);
    println!(
        "Location:        {}",
        if selection.on_chip { "on-chip" } else { "external" }
    );

    if let Some(flash) = bank.probed() {
        println!();
        println!("Device:          {}", flash.name);
        println!("JEDEC ID:        0x{:06X}", flash.id);
        println!(
            "Size:            {} bytes ({} KiB)",
            flash.size,
            flash.size / 1024
        );
        println!(
            "Sectors:         {} x {} bytes",
            flash.sectors.len(),
            flash.sectors.first().map_or(0, |s| s.size)
        );
        println!(
            "Addressing:      {}",
            if flash.addr_4byte { "4-byte" } else { "3-byte" }
        );
    }
    Ok(())
}
