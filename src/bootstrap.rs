//! Two-stage baud-rate negotiation.
//!
//! The mask ROM only talks XMODEM at 115200 baud. It first receives a
//! small baud-rate switcher blob, then, over the reopened high-speed
//! link, the stage-2 executor (ATED) that understands the framed command
//! protocol. Both blobs come from the vendor toolchain and are opaque.

use std::fs;
use std::path::Path;

use crate::constants::BOOTSTRAP_BAUD;
use crate::error::{Error, Result};
use crate::transfer::{percent_bar, BlockTransfer, Xmodem};
use crate::transport::{SerialTransport, Speed};

pub struct Bootstrap<'a> {
    port: &'a str,
    speed: Speed,
    blob_dir: &'a Path,
}

impl<'a> Bootstrap<'a> {
    pub fn new(port: &'a str, speed: Speed, blob_dir: &'a Path) -> Self {
        Bootstrap {
            port,
            speed,
            blob_dir,
        }
    }

    /// Run the negotiation and return the high-speed transport.
    ///
    /// Commands are only legal on the link this returns; constructing a
    /// `Session` from anything else is a caller bug.
    pub fn run(self) -> Result<SerialTransport> {
        let mut transport = SerialTransport::open(self.port, BOOTSTRAP_BAUD)?;
        let (name, blob) = self.load_blob("uart")?;
        log::info!("Sending baudrate switcher ({})", name);
        send_blob(&mut transport, &blob)?;
        // the switcher reboots the ROM loader at the new rate
        drop(transport);

        let mut transport = SerialTransport::open(self.port, self.speed.baud())?;
        let (name, blob) = self.load_blob("ated")?;
        log::info!("Sending executor ({})", name);
        send_blob(&mut transport, &blob)?;
        Ok(transport)
    }

    fn load_blob(&self, kind: &str) -> Result<(String, Vec<u8>)> {
        let name = format!("{}_{}.bin", kind, self.speed.suffix());
        let path = self.blob_dir.join(&name);
        let blob = fs::read(&path).map_err(|source| Error::Blob { path, source })?;
        Ok((name, blob))
    }
}

fn send_blob(transport: &mut SerialTransport, blob: &[u8]) -> Result<()> {
    let bar = percent_bar("  Sending", blob.len().div_ceil(1024) as u64);
    Xmodem::new(transport).send(blob, &mut |done, _| bar.set_position(done as u64))?;
    bar.finish();
    Ok(())
}
