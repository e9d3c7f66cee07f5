//! MT7687 serial bootloader protocol implementation.

pub mod bootstrap;
pub mod constants;
pub mod error;
pub mod flashing;
pub mod protocol;
pub mod transfer;
pub mod transport;

pub use self::error::{Error, ProtocolError, Result, TransferError};
pub use self::flashing::Flashing;
pub use self::protocol::{Command, Session, StorageInfo};
pub use self::transfer::BlockTransfer;
pub use self::transport::{Speed, Transport};
