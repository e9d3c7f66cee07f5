use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use mtflash::{Flashing, Speed};

#[derive(clap::Parser)]
#[command(
    name = "mtflash",
    about = "Flashes the external flash of MT7687/MT7697 boards through the serial bootloader"
)]
struct Cli {
    /// Show debug output
    #[arg(short, long)]
    verbose: bool,

    /// Path to the directory containing the bootstrap blobs
    #[arg(short, long, value_name = "DIR", default_value = "bin")]
    bin: PathBuf,

    /// Serial port device
    #[arg(short, long, value_name = "PORT", default_value = "/dev/ttyACM0")]
    port: String,

    /// Port speed profile
    #[arg(short, long, value_enum, default_value_t = Speed::High)]
    speed: Speed,

    /// Wipe the entire flash memory first
    #[arg(short, long)]
    erase: bool,

    /// Write a file to flash memory
    #[arg(short, long, value_name = "ADDR:FILE", value_parser = parse_write)]
    write: Vec<WriteSpec>,
}

#[derive(Debug, Clone)]
struct WriteSpec {
    addr: u32,
    path: PathBuf,
}

fn parse_write(s: &str) -> Result<WriteSpec, String> {
    let (addr, path) = s
        .split_once(':')
        .ok_or_else(|| format!("expected ADDR:FILE, got \"{}\"", s))?;
    Ok(WriteSpec {
        addr: parse_u32(addr)?,
        path: PathBuf::from(path),
    })
}

/// Parse an integer in decimal or with a 0x/0o/0b radix prefix.
fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let (digits, radix) = match s.get(..2) {
        Some("0x") | Some("0X") => (&s[2..], 16),
        Some("0o") | Some("0O") => (&s[2..], 8),
        Some("0b") | Some("0B") => (&s[2..], 2),
        _ => (s, 10),
    };
    u32::from_str_radix(digits, radix).map_err(|e| format!("invalid address \"{}\": {}", s, e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let mut flashing = Flashing::new_from_serial(&cli.port, cli.speed, &cli.bin)?;
    flashing.initialize()?;
    let info = flashing.storage_info()?;
    log::info!("Flash size: 0x{:x}", info.size);

    if cli.erase {
        log::info!("Erasing flash memory...");
        flashing.erase_range(0, info.size)?;
    }

    for spec in &cli.write {
        let data = std::fs::read(&spec.path)
            .with_context(|| format!("cannot read {}", spec.path.display()))?;
        log::info!("Writing to 0x{:x}: {}", spec.addr, spec.path.display());
        // a whole-chip erase already covered this range
        flashing.write_file(spec.addr, &data, !cli.erase)?;
    }

    Ok(())
}
