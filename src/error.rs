//! Error taxonomy of the flashing stack.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Opening or configuring the serial port failed.
    #[error("serial port error: {0}")]
    Transport(#[from] serialport::Error),

    /// A read or write on the open port failed.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device stayed silent past the allowed window.
    #[error("device did not respond within {0:?}")]
    Timeout(Duration),

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("block transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A bootstrap blob could not be loaded from disk.
    #[error("cannot load bootstrap blob {}: {source}", .path.display())]
    Blob {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A reply that fails validation.
///
/// Any of these poisons the current run; the command layer never retries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("bad reply magic 0x{found:08x}")]
    Magic { found: u32 },

    #[error("reply tag 0x{received:04x} does not match request tag 0x{sent:04x}")]
    Tag { sent: u16, received: u16 },

    #[error("reply opcode 0x{found:04x}, expected 0x{expected:04x}")]
    Opcode { expected: u16, found: u16 },

    #[error("frame carries CRC 0x{received:04x}, computed 0x{computed:04x}")]
    Crc { computed: u16, received: u16 },

    #[error("reply declares impossible payload length {0}")]
    Length(u16),

    #[error("malformed reply: {0}")]
    Malformed(String),
}

/// Failure of the chunked block transfer.
///
/// Retries happen inside the block layer; once one of these surfaces the
/// transfer is over.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("receiver never requested the transfer")]
    NoHandshake,

    #[error("block {block} was not acknowledged after {retries} attempts")]
    RetriesExhausted { block: u8, retries: usize },

    #[error("receiver cancelled the transfer")]
    Cancelled,

    #[error("end of transfer was never acknowledged")]
    EotUnacknowledged,
}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Self {
        Error::Protocol(ProtocolError::Malformed(err.to_string()))
    }
}
