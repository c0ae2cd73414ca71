//! List commands implementation

use esio_host::ChipDatabase;

/// List all known eSIO parts
pub fn list_chips(db: &ChipDatabase, series_filter: Option<&str>) {
    println!("Known eSIO parts:");
    println!();
    println!("{:<12} {:<18} {:>10} {:>10}", "Name", "Series", "Size", "Flash ID");
    println!("{}", "-".repeat(54));

    for chip in db.chips() {
        if let Some(series) = series_filter {
            if !chip.series.name().contains(series) {
                continue;
            }
        }

        println!(
            "{:<12} {:<18} {:>10} {:>10}",
            chip.name,
            chip.series.name(),
            format_size(chip.size),
            format!("0x{:06X}", chip.id)
        );
    }
}

fn format_size(bytes: u32) -> String {
    if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512 * 1024), "512 KiB");
        assert_eq!(format_size(2 * 1024 * 1024), "2 MiB");
        assert_eq!(format_size(100), "100 B");
    }
}
