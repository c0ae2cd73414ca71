//! Verify command implementation

use esio_host::{DebugTarget, FlashBank};
use std::path::Path;

use super::progress::IndicatifProgress;

/// Run the verify command
pub fn run_verify<T: DebugTarget>(
    bank: &mut FlashBank,
    target: &mut T,
    input: &Path,
    start: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    bank.auto_probe(target)?;
    println!("{}", bank.info());

    let expected = std::fs::read(input)?;
    println!("Read {} bytes from {:?}", expected.len(), input);

    let mut progress = IndicatifProgress::new();
    bank.verify(target, start, &expected, &mut progress)?;

    println!("Verification passed!");
    Ok(())
}
