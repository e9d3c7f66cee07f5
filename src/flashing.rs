//! Flash erase/write orchestration.

use std::path::Path;

use crate::bootstrap::Bootstrap;
use crate::constants::{ERASE_BLOCK_SIZE, WRITE_ALIGNMENT};
use crate::error::{Error, Result};
use crate::protocol::{Command, Session, StorageInfo};
use crate::transfer::{percent_bar, BlockTransfer, Xmodem};
use crate::transport::{SerialTransport, Speed, Transport};

pub struct Flashing<T: Transport> {
    session: Session<T>,
}

impl Flashing<SerialTransport> {
    /// Bootstrap the device on `port` and return a ready flasher.
    pub fn new_from_serial(port: &str, speed: Speed, blob_dir: &Path) -> Result<Self> {
        let transport = Bootstrap::new(port, speed, blob_dir).run()?;
        Ok(Flashing::new(Session::new(transport)))
    }
}

impl<T: Transport> Flashing<T> {
    pub fn new(session: Session<T>) -> Self {
        Flashing { session }
    }

    pub fn initialize(&mut self) -> Result<()> {
        log::debug!("cmd: initialize");
        self.session.execute(&Command::Initialize)?;
        Ok(())
    }

    pub fn storage_info(&mut self) -> Result<StorageInfo> {
        log::debug!("cmd: get_storage_info");
        let body = self.session.execute(&Command::GetStorageInfo)?;
        StorageInfo::from_reply(&body)
    }

    pub fn erase(&mut self, start: u32, length: u32) -> Result<()> {
        log::debug!("cmd: erase(0x{:x}, 0x{:x})", start, length);
        self.session.execute(&Command::Erase { start, length })?;
        Ok(())
    }

    pub fn erase_end(&mut self) -> Result<()> {
        log::debug!("cmd: erase_end");
        self.session.execute(&Command::EraseEnd)?;
        Ok(())
    }

    pub fn download(&mut self, address: u32, length: u32) -> Result<()> {
        log::debug!("cmd: download(0x{:x}, 0x{:x})", address, length);
        self.session.execute(&Command::Download { address, length })?;
        Ok(())
    }

    pub fn download_end(&mut self) -> Result<()> {
        log::debug!("cmd: download_end");
        self.session.execute(&Command::DownloadEnd)?;
        Ok(())
    }

    /// Erase `[addr, addr + length)` in default-sized chunks.
    pub fn erase_range(&mut self, addr: u32, length: u32) -> Result<()> {
        self.erase_range_with(addr, length, ERASE_BLOCK_SIZE)
    }

    /// Erase `[addr, addr + length)` in chunks of at most `block_size`,
    /// closing the sequence with exactly one `erase_end`.
    pub fn erase_range_with(&mut self, addr: u32, length: u32, block_size: u32) -> Result<()> {
        if block_size == 0 {
            return Err(Error::InvalidArgument(
                "erase block size must be nonzero".into(),
            ));
        }
        if addr.checked_add(length).is_none() {
            return Err(Error::InvalidArgument(format!(
                "erase range 0x{:x}+0x{:x} overflows the address space",
                addr, length
            )));
        }

        let bar = percent_bar("  Erasing", length as u64);
        let mut offset = 0;
        while offset < length {
            let chunk = block_size.min(length - offset);
            self.erase(addr + offset, chunk)?;
            offset += chunk;
            bar.set_position(offset as u64);
        }
        self.erase_end()?;
        bar.finish();
        Ok(())
    }

    /// Write `data` to flash at `addr`, erasing the padded range first
    /// unless the caller already wiped the chip.
    ///
    /// `addr` must be 4 KiB aligned. The device is told the unpadded
    /// length; only the erase covers the padded range.
    pub fn write_file(&mut self, addr: u32, data: &[u8], erase: bool) -> Result<()> {
        if addr % WRITE_ALIGNMENT != 0 {
            return Err(Error::InvalidArgument(format!(
                "write address 0x{:x} is not aligned to 0x{:x}",
                addr, WRITE_ALIGNMENT
            )));
        }
        let length = u32::try_from(data.len()).map_err(|_| {
            Error::InvalidArgument("file does not fit in a 32-bit address space".into())
        })?;
        let padded = length
            .checked_add(WRITE_ALIGNMENT - 1)
            .map(|n| n & !(WRITE_ALIGNMENT - 1))
            .ok_or_else(|| {
                Error::InvalidArgument(format!("file of 0x{:x} bytes cannot be padded", length))
            })?;

        if erase {
            self.erase_range(addr, padded)?;
        }

        self.download(addr, length)?;
        let bar = percent_bar("  Writing", data.len().div_ceil(1024) as u64);
        Xmodem::new(self.session.transport_mut())
            .send(data, &mut |done, _| bar.set_position(done as u64))?;
        bar.finish();
        self.download_end()
    }
}
