//! Read command implementation

use esio_host::{DebugTarget, FlashBank};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::progress::IndicatifProgress;

/// Run the read command
pub fn run_read<T: DebugTarget>(
    bank: &mut FlashBank,
    target: &mut T,
    output: &Path,
    start: u32,
    length: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    bank.auto_probe(target)?;
    println!("{}", bank.info());

    let size = bank.probed().map_or(0, |f| f.size);
    let length = match length {
        Some(len) => len,
        None => size.checked_sub(start).ok_or_else(|| {
            format!("Start 0x{:08X} is beyond flash size 0x{:08X}", start, size)
        })?,
    };

    let mut data = vec![0u8; length as usize];
    let mut progress = IndicatifProgress::new();
    bank.read(target, start, &mut data, &mut progress)?;

    let mut file = File::create(output)?;
    file.write_all(&data)?;

    println!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}
