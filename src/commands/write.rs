//! Write command implementation

use esio_host::{DebugTarget, FlashBank};
use std::path::Path;

use super::erase::sector_span;
use super::progress::IndicatifProgress;

/// Run the write command
///
/// Erases the sectors the file covers, programs it and reads it back.
pub fn run_write<T: DebugTarget>(
    bank: &mut FlashBank,
    target: &mut T,
    input: &Path,
    start: u32,
    verify: bool,
    no_erase: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    bank.auto_probe(target)?;
    println!("{}", bank.info());

    let data = std::fs::read(input)?;
    println!("Read {} bytes from {:?}", data.len(), input);
    if data.is_empty() {
        return Err("Input file is empty".into());
    }

    let size = bank.probed().map_or(0, |f| f.size);
    if u64::from(start) + data.len() as u64 > u64::from(size) {
        return Err(format!(
            "File size ({} bytes) at 0x{:08X} exceeds flash size ({} bytes)",
            data.len(),
            start,
            size
        )
        .into());
    }

    let mut progress = IndicatifProgress::new();
    if !no_erase {
        let (first, last) = sector_span(start, data.len() as u32).ok_or("Write range overflows")?;
        bank.erase(target, first, last, &mut progress)?;
    }
    bank.program(target, start, &data, &mut progress)?;
    println!("Wrote {} bytes at 0x{:08X}", data.len(), start);

    if verify {
        bank.verify(target, start, &data, &mut progress)?;
        println!("Verification passed!");
    }
    Ok(())
}
