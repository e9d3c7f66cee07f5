use std::time::Duration;

/// Request frame magic. Replies carry the same constant with the high bit set.
pub const MAGIC: u32 = 0x0005_2001;
pub const RESPONSE_FLAG: u32 = 0x8000_0000;

/// Tag counter start. Everything below this range belongs to bootstrap
/// traffic and must never collide with command tags.
pub const INITIAL_TAG: u16 = 0x1000;

/// Read and write window for one command exchange.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Baud rate every bootloader conversation starts at.
pub const BOOTSTRAP_BAUD: u32 = 115_200;

/// Opaque flag word the download command requires. Bit meaning is
/// undocumented; the stage-2 executor rejects anything else.
pub const DOWNLOAD_FLAGS: u32 = 0x0100_0400;

/// Write addresses must sit on a 4 KiB boundary; write lengths are padded
/// up to it before erasing.
pub const WRITE_ALIGNMENT: u32 = 0x1000;

/// Default erase chunk. The controller accepts far larger ranges, but
/// smaller chunks give smoother progress output.
pub const ERASE_BLOCK_SIZE: u32 = 0x2000;

pub mod opcodes {
    pub const INITIALIZE: u16 = 0x00;
    pub const DOWNLOAD: u16 = 0x02;
    pub const DOWNLOAD_END: u16 = 0x04;
    pub const ERASE: u16 = 0x0a;
    pub const ERASE_END: u16 = 0x0c;
    pub const STORAGE_INFO: u16 = 0x10;
}
