//! eSIO chip table
//!
//! Maps an eSIO part name to its series and to the on-chip flash it carries.
//! The built-in entries cover the parts the resident programs were written
//! for; more can be loaded from a RON file at runtime:
//!
//! ```ron
//! [
//!     (series: Nct6694, name: "NCT6796D", id: 0xEF4015, size: MiB(2)),
//! ]
//! ```

use alloc::string::{String, ToString};
use alloc::vec::Vec;

#[cfg(feature = "std")]
use std::path::Path;

#[cfg(feature = "std")]
use thiserror::Error;

/// eSIO controller family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "std", derive(serde::Deserialize))]
pub enum EsioSeries {
    /// NCT6692D generation: legacy FIU, PVT and SHD ports
    Nct6692,
    /// NCT6694D generation: FIU with PVT, SHD and BKP, plus SPIM on-die flash
    Nct6694,
}

impl EsioSeries {
    /// Display name of the series
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Nct6692 => "NCT6692D series",
            Self::Nct6694 => "NCT6694D series",
        }
    }
}

impl core::fmt::Display for EsioSeries {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// One eSIO part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipInfo {
    /// Controller family
    pub series: EsioSeries,
    /// Part name, matched case-insensitively
    pub name: String,
    /// JEDEC id of the on-chip flash
    pub id: u32,
    /// Size of the on-chip flash in bytes
    pub size: u32,
}

const KIB: u32 = 1024;
const MIB: u32 = 1024 * 1024;

const BUILTIN: &[(EsioSeries, &str, u32, u32)] = &[
    (EsioSeries::Nct6692, "NCT6801D", 0xEF4014, MIB),
    (EsioSeries::Nct6694, "NCT6812D", 0xEF4013, 512 * KIB),
    (EsioSeries::Nct6694, "NCT6832D", 0xEF4014, MIB),
    (EsioSeries::Nct6692, "NCT6692D", 0xEF4013, 512 * KIB),
    (EsioSeries::Nct6694, "NCT6694B", 0xEF4015, 2 * MIB),
    (EsioSeries::Nct6694, "NCT9650HB", 0xEF4014, MIB),
];

/// Lookup table of eSIO parts
#[derive(Debug, Clone, Default)]
pub struct ChipDatabase {
    chips: Vec<ChipInfo>,
}

impl ChipDatabase {
    /// Empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Database holding the built-in parts
    pub fn builtin() -> Self {
        let chips = BUILTIN
            .iter()
            .map(|&(series, name, id, size)| ChipInfo {
                series,
                name: name.to_string(),
                id,
                size,
            })
            .collect();
        Self { chips }
    }

    /// Add a part, replacing any entry of the same name
    pub fn add(&mut self, chip: ChipInfo) {
        match self.chips.iter_mut().find(|c| c.name.eq_ignore_ascii_case(&chip.name)) {
            Some(existing) => *existing = chip,
            None => self.chips.push(chip),
        }
    }

    /// Find a part by name
    pub fn find(&self, name: &str) -> Option<&ChipInfo> {
        self.chips.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// All parts
    pub fn chips(&self) -> &[ChipInfo] {
        &self.chips
    }

    /// Number of parts
    pub fn len(&self) -> usize {
        self.chips.len()
    }

    /// Whether the database is empty
    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }
}

// ============================================================================
// RON loading
// ============================================================================

/// Error type for chip database loading
#[cfg(feature = "std")]
#[derive(Debug, Error)]
pub enum ChipDbError {
    /// I/O error reading the file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// RON parsing error
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Entry failed validation
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Size specification with human-readable units (for RON parsing)
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub enum Size {
    /// Size in bytes
    B(u32),
    /// Size in kibibytes (1024 bytes)
    KiB(u32),
    /// Size in mebibytes (1024 * 1024 bytes)
    MiB(u32),
}

#[cfg(feature = "std")]
impl Size {
    /// Convert to bytes
    pub fn to_bytes(self) -> u32 {
        match self {
            Size::B(n) => n,
            Size::KiB(n) => n * KIB,
            Size::MiB(n) => n * MIB,
        }
    }
}

#[cfg(feature = "std")]
#[derive(Debug, serde::Deserialize)]
struct ChipDef {
    series: EsioSeries,
    name: String,
    id: u32,
    size: Size,
}

#[cfg(feature = "std")]
impl ChipDatabase {
    /// Add every part from RON text, returning how many were added
    pub fn load_ron_str(&mut self, text: &str) -> Result<usize, ChipDbError> {
        let defs: Vec<ChipDef> = ron::from_str(text)?;
        let count = defs.len();
        for def in defs {
            let size = def.size.to_bytes();
            if def.name.is_empty() {
                return Err(ChipDbError::Validation("empty chip name".into()));
            }
            if size == 0 || size % esio_core::spi::SECTOR_SIZE != 0 {
                return Err(ChipDbError::Validation(format!(
                    "{}: size {} is not a whole number of 4 KiB sectors",
                    def.name, size
                )));
            }
            if def.id == 0 || def.id > 0x00FF_FFFF {
                return Err(ChipDbError::Validation(format!(
                    "{}: 0x{:x} is not a 3-byte JEDEC id",
                    def.name, def.id
                )));
            }
            self.add(ChipInfo {
                series: def.series,
                name: def.name,
                id: def.id,
                size,
            });
        }
        log::debug!("Loaded {} chip definitions", count);
        Ok(count)
    }

    /// Add every part from a RON file
    pub fn load_ron_file(&mut self, path: &Path) -> Result<usize, ChipDbError> {
        let text = std::fs::read_to_string(path)?;
        self.load_ron_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup_is_case_insensitive() {
        let db = ChipDatabase::builtin();
        assert_eq!(db.len(), 6);
        let chip = db.find("nct6694b").unwrap();
        assert_eq!(chip.series, EsioSeries::Nct6694);
        assert_eq!(chip.id, 0xEF4015);
        assert_eq!(chip.size, 2 * MIB);
        assert!(db.find("NCT1234").is_none());
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_load_ron_adds_and_replaces() {
        let mut db = ChipDatabase::builtin();
        let added = db
            .load_ron_str(
                r#"[
                    (series: Nct6694, name: "NCT6796D", id: 0xEF4015, size: MiB(2)),
                    (series: Nct6692, name: "NCT6801D", id: 0xEF4013, size: KiB(512)),
                ]"#,
            )
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(db.len(), 7);
        assert_eq!(db.find("NCT6796D").unwrap().size, 2 * MIB);
        assert_eq!(db.find("NCT6801D").unwrap().id, 0xEF4013);
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_load_ron_rejects_partial_sector_size() {
        let mut db = ChipDatabase::new();
        let err = db
            .load_ron_str(r#"[(series: Nct6694, name: "X", id: 0xEF4015, size: B(1000))]"#)
            .unwrap_err();
        assert!(matches!(err, ChipDbError::Validation(_)));
    }
}
