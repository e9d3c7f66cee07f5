//! The framed request/reply protocol spoken by the stage-2 executor.
//!
//! Every exchange is one request frame answered by one reply frame:
//! `magic | length | tag | opcode | body | crc16`, all fields big-endian.
//! The reply echoes the tag, sets the high magic bit and answers with
//! `opcode + 1`. Anything that fails validation kills the run; there is
//! no retry at this layer.

use scroll::{Pread, Pwrite, BE};

use crate::constants::{opcodes, COMMAND_TIMEOUT, DOWNLOAD_FLAGS, INITIAL_TAG, MAGIC, RESPONSE_FLAG};
use crate::error::{Error, ProtocolError, Result};
use crate::transfer::crc16;
use crate::transport::Transport;

/// A command understood by the stage-2 executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Bring up the flash controller. Must precede every other command.
    Initialize,
    /// Query the geometry of the external flash.
    GetStorageInfo,
    /// Erase `length` bytes starting at `start`.
    Erase { start: u32, length: u32 },
    /// Close a sequence of `Erase` commands.
    EraseEnd,
    /// Announce an XMODEM payload of `length` bytes for `address`.
    Download { address: u32, length: u32 },
    /// Close a download session.
    DownloadEnd,
}

impl Command {
    pub fn opcode(&self) -> u16 {
        match self {
            Command::Initialize => opcodes::INITIALIZE,
            Command::GetStorageInfo => opcodes::STORAGE_INFO,
            Command::Erase { .. } => opcodes::ERASE,
            Command::EraseEnd => opcodes::ERASE_END,
            Command::Download { .. } => opcodes::DOWNLOAD,
            Command::DownloadEnd => opcodes::DOWNLOAD_END,
        }
    }

    pub fn body(&self) -> Result<Vec<u8>> {
        match *self {
            Command::Initialize
            | Command::GetStorageInfo
            | Command::EraseEnd
            | Command::DownloadEnd => Ok(Vec::new()),
            Command::Erase { start, length } => {
                let mut buf = vec![0u8; 8];
                buf.pwrite_with(start, 0, BE)?;
                buf.pwrite_with(length, 4, BE)?;
                Ok(buf)
            }
            Command::Download { address, length } => {
                let end = address.checked_add(length).ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "download range 0x{:x}+0x{:x} overflows the address space",
                        address, length
                    ))
                })?;
                let mut buf = vec![0u8; 16];
                buf.pwrite_with(address, 0, BE)?;
                buf.pwrite_with(length, 4, BE)?;
                buf.pwrite_with(end, 8, BE)?;
                buf.pwrite_with(DOWNLOAD_FLAGS, 12, BE)?;
                Ok(buf)
            }
        }
    }
}

/// Geometry reported by [`Command::GetStorageInfo`].
///
/// The first two words come back from the executor with no documented
/// meaning; they are kept verbatim rather than dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageInfo {
    pub reserved: [u32; 2],
    /// Flash size in bytes.
    pub size: u32,
}

impl StorageInfo {
    pub(crate) fn from_reply(body: &[u8]) -> Result<Self> {
        if body.len() != 12 {
            return Err(ProtocolError::Malformed(format!(
                "storage info reply is {} bytes, expected 12",
                body.len()
            ))
            .into());
        }
        Ok(StorageInfo {
            reserved: [body.pread_with(0, BE)?, body.pread_with(4, BE)?],
            size: body.pread_with(8, BE)?,
        })
    }
}

pub(crate) fn encode_frame(tag: u16, command: &Command) -> Result<Vec<u8>> {
    let body = command.body()?;
    let mut buf = vec![0u8; 12 + body.len()];
    buf.pwrite_with(MAGIC, 0, BE)?;
    // declared length covers opcode, body and the trailing CRC
    buf.pwrite_with((body.len() + 4) as u16, 4, BE)?;
    buf.pwrite_with(tag, 6, BE)?;
    buf.pwrite_with(command.opcode(), 8, BE)?;
    buf[10..10 + body.len()].copy_from_slice(&body);
    let crc = crc16(&buf[..10 + body.len()]);
    let at = 10 + body.len();
    buf.pwrite_with(crc, at, BE)?;
    Ok(buf)
}

/// One serial link to a booted executor, plus the tag counter correlating
/// requests to replies. Tags only ever move forward within a run.
pub struct Session<T: Transport> {
    transport: T,
    tag: u16,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Session {
            transport,
            tag: INITIAL_TAG,
        }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Send one command and return the reply body.
    pub fn execute(&mut self, command: &Command) -> Result<Vec<u8>> {
        self.tag = self.tag.wrapping_add(1);
        let request = encode_frame(self.tag, command)?;
        log::debug!("=> {}", hex::encode(&request));
        self.transport.send_raw(&request, COMMAND_TIMEOUT)?;

        let header = self.transport.recv_exact(8, COMMAND_TIMEOUT)?;
        let magic: u32 = header.pread_with(0, BE)?;
        let length: u16 = header.pread_with(4, BE)?;
        let tag: u16 = header.pread_with(6, BE)?;
        if magic != MAGIC | RESPONSE_FLAG {
            return Err(ProtocolError::Magic { found: magic }.into());
        }
        if tag != self.tag {
            return Err(ProtocolError::Tag {
                sent: self.tag,
                received: tag,
            }
            .into());
        }
        if length < 4 {
            return Err(ProtocolError::Length(length).into());
        }

        let mut frame = header;
        frame.extend_from_slice(&self.transport.recv_exact(length as usize, COMMAND_TIMEOUT)?);
        let received: u16 = frame.pread_with(frame.len() - 2, BE)?;
        let computed = crc16(&frame[..frame.len() - 2]);
        if computed != received {
            return Err(ProtocolError::Crc { computed, received }.into());
        }
        let opcode: u16 = frame.pread_with(8, BE)?;
        if opcode != command.opcode() + 1 {
            return Err(ProtocolError::Opcode {
                expected: command.opcode() + 1,
                found: opcode,
            }
            .into());
        }

        let body = frame[10..frame.len() - 2].to_vec();
        log::debug!("<= {}", hex::encode(&body));
        Ok(body)
    }
}
