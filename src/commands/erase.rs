//! Erase command implementation

use esio_core::spi::SECTOR_SIZE;
use esio_host::{DebugTarget, FlashBank};

use super::progress::IndicatifProgress;

/// Sector range `first..=last` covering `start..start + length`
pub fn sector_span(start: u32, length: u32) -> Option<(usize, usize)> {
    if length == 0 {
        return None;
    }
    let end = start.checked_add(length - 1)?;
    Some(((start / SECTOR_SIZE) as usize, (end / SECTOR_SIZE) as usize))
}

/// Run the erase command
pub fn run_erase<T: DebugTarget>(
    bank: &mut FlashBank,
    target: &mut T,
    start: Option<u32>,
    length: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    bank.auto_probe(target)?;
    println!("{}", bank.info());

    let (first, last) = match (start, length) {
        (Some(start_addr), Some(len)) => {
            if start_addr % SECTOR_SIZE != 0 || len % SECTOR_SIZE != 0 {
                log::warn!("Erase range rounded out to {} byte sectors", SECTOR_SIZE);
            }
            sector_span(start_addr, len).ok_or("Erase length must be nonzero")?
        }
        (Some(_), None) | (None, Some(_)) => {
            return Err("Both --start and --length must be specified for partial erase".into());
        }
        (None, None) => {
            let count = bank.num_sectors();
            if count == 0 {
                return Err("Flash reports no sectors".into());
            }
            (0, count - 1)
        }
    };

    let mut progress = IndicatifProgress::new();
    bank.erase(target, first, last, &mut progress)?;
    println!(
        "Erased sectors {}..={} (0x{:08X} - 0x{:08X})",
        first,
        last,
        first as u32 * SECTOR_SIZE,
        (last as u32 + 1) * SECTOR_SIZE - 1
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_span_rounds_out() {
        assert_eq!(sector_span(0x3000, 0x5000), Some((3, 7)));
        assert_eq!(sector_span(0x3800, 0x100), Some((3, 3)));
        assert_eq!(sector_span(0x0FFF, 2), Some((0, 1)));
        assert_eq!(sector_span(0, 0), None);
        assert_eq!(sector_span(u32::MAX, 2), None);
    }
}
