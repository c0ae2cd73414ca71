//! CLI argument parsing

use clap::{Parser, Subcommand};
use esio_core::mailbox::Port;
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a size such as "512K", "16M" or "0x100000"
fn parse_size(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let (num, mult) = if let Some(n) = s.strip_suffix(['K', 'k']) {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix(['M', 'm']) {
        (n, 1024 * 1024)
    } else {
        (s, 1)
    };
    let value = parse_hex_u32(num)?;
    value
        .checked_mul(mult)
        .ok_or_else(|| format!("Size too large: {}", s))
}

/// Parse a flash port name
fn parse_port(s: &str) -> Result<Port, String> {
    match s.to_ascii_lowercase().as_str() {
        "pvt" => Ok(Port::Pvt),
        "shd" => Ok(Port::Shd),
        "bkp" => Ok(Port::Bkp),
        "internal" | "int" => Ok(Port::Internal),
        _ => Err(format!("Unknown port '{}' [available: pvt, shd, bkp, internal]", s)),
    }
}

#[derive(Parser)]
#[command(name = "esioflash")]
#[command(author, version, about = "Nuvoton eSIO SPI flash programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// eSIO part name (see list-chips)
    #[arg(short, long, global = true)]
    pub chip: Option<String>,

    /// Flash bank base address (hex, e.g. 0x70000000)
    #[arg(short, long, global = true, value_parser = parse_hex_u32)]
    pub base: Option<u32>,

    /// Extra chip definitions (RON file)
    #[arg(long, global = true)]
    pub chip_db: Option<PathBuf>,

    /// Directory holding esio-resident-<engine>.bin images
    #[arg(long, global = true)]
    pub images: Option<PathBuf>,

    /// Bound on one resident request, in milliseconds
    #[arg(long, global = true, default_value_t = esio_host::DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u32,

    #[command(flatten)]
    pub sim: SimArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Simulated target options
#[derive(clap::Args, Debug, Clone)]
pub struct SimArgs {
    /// Port the simulated flash hangs off (defaults to the port behind --base)
    #[arg(long, global = true, value_parser = parse_port)]
    pub sim_port: Option<Port>,

    /// JEDEC id of the simulated flash (defaults to the chip's on-chip id)
    #[arg(long, global = true, value_parser = parse_hex_u32)]
    pub sim_id: Option<u32>,

    /// Size of the simulated flash (e.g. 16M, 0x1000000)
    #[arg(long, global = true, value_parser = parse_size)]
    pub sim_size: Option<u32>,

    /// Simulated flash has no SFDP table
    #[arg(long, global = true)]
    pub sim_no_sfdp: bool,

    /// Make the erase of the sector at this address never finish
    #[arg(long, global = true, value_parser = parse_hex_u32)]
    pub sim_stuck_erase: Option<u32>,

    /// Preload the simulated flash from this file
    #[arg(long, global = true)]
    pub sim_load: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe the flash behind the bank
    Probe,

    /// Show bank and flash information
    Info,

    /// Read flash contents to file
    Read {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Start offset (hex)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,

        /// Number of bytes (defaults to the rest of the flash)
        #[arg(long, value_parser = parse_hex_u32)]
        length: Option<u32>,
    },

    /// Write file to flash
    Write {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Start offset (hex)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,

        /// Verify after writing
        #[arg(long, default_value = "true")]
        verify: bool,

        /// Don't erase before writing
        #[arg(long)]
        no_erase: bool,
    },

    /// Erase flash sectors
    Erase {
        /// Start address for partial erase (hex, e.g., 0x10000)
        #[arg(long, value_parser = parse_hex_u32)]
        start: Option<u32>,

        /// Length of region to erase (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        length: Option<u32>,
    },

    /// Verify flash contents against file
    Verify {
        /// Input file path to verify against
        #[arg(short, long)]
        input: PathBuf,

        /// Start offset (hex)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        start: u32,
    },

    /// List known eSIO parts
    ListChips {
        /// Filter by series (6692 or 6694)
        #[arg(long)]
        series: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_hex_u32("0x70000000"), Ok(0x7000_0000));
        assert_eq!(parse_hex_u32("4096"), Ok(4096));
        assert!(parse_hex_u32("0xZZ").is_err());
        assert_eq!(parse_size("16M"), Ok(16 * 1024 * 1024));
        assert_eq!(parse_size("512k"), Ok(512 * 1024));
        assert_eq!(parse_size("0x1000"), Ok(0x1000));
    }

    #[test]
    fn test_parse_port_names() {
        assert_eq!(parse_port("SHD"), Ok(Port::Shd));
        assert_eq!(parse_port("int"), Ok(Port::Internal));
        assert!(parse_port("lpc").is_err());
    }

    #[test]
    fn test_cli_globals_after_subcommand() {
        let cli = Cli::try_parse_from([
            "esioflash",
            "read",
            "-o",
            "out.bin",
            "--chip",
            "NCT6694B",
            "--base",
            "0x70000000",
            "--sim-size",
            "16M",
        ])
        .unwrap();
        assert_eq!(cli.chip.as_deref(), Some("NCT6694B"));
        assert_eq!(cli.base, Some(0x7000_0000));
        assert_eq!(cli.sim.sim_size, Some(16 * 1024 * 1024));
        assert!(matches!(cli.command, Commands::Read { start: 0, length: None, .. }));
    }
}
