//! Reliable chunked block transfer over the serial link.
use crc::{Crc, CRC_16_XMODEM};
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::Result;

pub use self::xmodem::Xmodem;

mod xmodem;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// CRC-16/XMODEM. The block transfer and the command framing share this
/// one checksum.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// A reliable chunked transfer that can push a byte buffer to the device.
///
/// `progress` is called with `(blocks_sent, blocks_total)` after each
/// acknowledged block. Retry behavior is internal to the implementation;
/// callers see only the final outcome.
pub trait BlockTransfer {
    fn send(&mut self, data: &[u8], progress: &mut dyn FnMut(usize, usize)) -> Result<()>;
}

pub(crate) fn percent_bar(msg: &'static str, len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len.max(1));
    bar.set_style(ProgressStyle::with_template("{msg}... {percent:>3}%").unwrap());
    bar.set_message(msg);
    bar
}
