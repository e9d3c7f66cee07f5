//! Serial transportation.
use std::fmt::Display;
use std::io::{Read, Write};
use std::time::Duration;

use clap::{builder::PossibleValue, ValueEnum};
use serialport::SerialPort;

use super::Transport;
use crate::error::{Error, Result};

/// Link speed profile. Selects both the target baud rate and the pair of
/// bootstrap blobs that get the device there.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Speed {
    Low,
    #[default]
    High,
    Super,
}

impl Speed {
    pub fn baud(self) -> u32 {
        match self {
            Speed::Low => 115_200,
            Speed::High => 921_600,
            Speed::Super => 3_000_000,
        }
    }

    /// Suffix used in bootstrap blob file names (`uart_hs.bin`, ...).
    pub fn suffix(self) -> &'static str {
        match self {
            Speed::Low => "ls",
            Speed::High => "hs",
            Speed::Super => "ss",
        }
    }
}

impl Display for Speed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

impl ValueEnum for Speed {
    fn value_variants<'a>() -> &'a [Self] {
        &[Speed::Low, Speed::High, Speed::Super]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        match self {
            Speed::Low => Some(PossibleValue::new("ls").aliases(["low", "115200"])),
            Speed::High => Some(PossibleValue::new("hs").aliases(["high", "921600"])),
            Speed::Super => Some(PossibleValue::new("ss").aliases(["super", "3000000"])),
        }
    }
}

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        log::info!("Opening serial port \"{}\" @ {} baud", path, baud);
        let port = serialport::new(path, baud)
            .timeout(Duration::from_secs(1))
            .open()?;
        Ok(SerialTransport { port })
    }
}

impl Transport for SerialTransport {
    fn send_raw(&mut self, raw: &[u8], timeout: Duration) -> Result<()> {
        self.port.set_timeout(timeout)?;
        self.port
            .write_all(raw)
            .map_err(|e| timeout_or_io(e, timeout))?;
        self.port.flush().map_err(|e| timeout_or_io(e, timeout))?;
        Ok(())
    }

    fn recv_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        self.port.set_timeout(timeout)?;
        let mut buf = vec![0u8; len];
        self.port
            .read_exact(&mut buf)
            .map_err(|e| timeout_or_io(e, timeout))?;
        Ok(buf)
    }
}

fn timeout_or_io(err: std::io::Error, window: Duration) -> Error {
    if err.kind() == std::io::ErrorKind::TimedOut {
        Error::Timeout(window)
    } else {
        Error::Io(err)
    }
}
