//! Abstract device transport interface.
use std::time::Duration;

use crate::error::Result;

pub use self::serial::{SerialTransport, Speed};

mod serial;

/// Abstraction of the serial link.
///
/// The protocol stack only ever needs timed writes and byte-exact timed
/// reads, so a scripted in-memory device can stand in for a real port.
pub trait Transport {
    fn send_raw(&mut self, raw: &[u8], timeout: Duration) -> Result<()>;
    fn recv_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>>;

    fn recv_byte(&mut self, timeout: Duration) -> Result<u8> {
        Ok(self.recv_exact(1, timeout)?[0])
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::time::Duration;

    use scroll::{Pread, Pwrite, BE};

    use super::Transport;
    use crate::constants::{opcodes, MAGIC, RESPONSE_FLAG};
    use crate::error::{Error, Result};
    use crate::transfer::crc16;

    /// Dumb transport: reads come from a preloaded byte queue, writes are
    /// recorded verbatim.
    pub struct MockTransport {
        pub rx: VecDeque<u8>,
        pub writes: Vec<Vec<u8>>,
    }

    impl MockTransport {
        pub fn new(rx: &[u8]) -> Self {
            MockTransport {
                rx: rx.iter().copied().collect(),
                writes: Vec::new(),
            }
        }
    }

    impl Transport for MockTransport {
        fn send_raw(&mut self, raw: &[u8], _timeout: Duration) -> Result<()> {
            self.writes.push(raw.to_vec());
            Ok(())
        }

        fn recv_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
            if self.rx.len() < len {
                return Err(Error::Timeout(timeout));
            }
            Ok(self.rx.drain(..len).collect())
        }
    }

    /// How a [`MockDevice`] should corrupt the replies it produces.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Tamper {
        Clean,
        BadMagic,
        WrongTag,
        WrongOpcode,
        BadCrc,
        /// Flip one bit of the first body byte after the CRC is computed.
        FlipBodyBit,
    }

    /// Scripted in-memory device. Parses request frames and answers them
    /// the way the stage-2 executor would; also plays the XMODEM receiver
    /// role so download sessions run end to end.
    pub struct MockDevice {
        rx: VecDeque<u8>,
        /// `(tag, opcode, body)` of every request frame seen.
        pub frames: Vec<(u16, u16, Vec<u8>)>,
        /// Reply bodies to hand out, oldest first. Empty body otherwise.
        pub reply_bodies: VecDeque<Vec<u8>>,
        pub tamper: Tamper,
        /// Padded 1024-byte payloads of every XMODEM block received.
        pub blocks: Vec<Vec<u8>>,
        pub eot_seen: bool,
    }

    impl MockDevice {
        pub fn new() -> Self {
            MockDevice {
                rx: VecDeque::new(),
                frames: Vec::new(),
                reply_bodies: VecDeque::new(),
                tamper: Tamper::Clean,
                blocks: Vec::new(),
                eot_seen: false,
            }
        }

        fn build_reply(&self, tag: u16, opcode: u16, body: &[u8]) -> Vec<u8> {
            let magic = match self.tamper {
                Tamper::BadMagic => MAGIC,
                _ => MAGIC | RESPONSE_FLAG,
            };
            let tag = match self.tamper {
                Tamper::WrongTag => tag ^ 0x0100,
                _ => tag,
            };
            let opcode = match self.tamper {
                Tamper::WrongOpcode => opcode + 2,
                _ => opcode + 1,
            };

            let mut buf = vec![0u8; 12 + body.len()];
            buf.pwrite_with(magic, 0, BE).unwrap();
            buf.pwrite_with((body.len() + 4) as u16, 4, BE).unwrap();
            buf.pwrite_with(tag, 6, BE).unwrap();
            buf.pwrite_with(opcode, 8, BE).unwrap();
            buf[10..10 + body.len()].copy_from_slice(body);

            let mut crc = crc16(&buf[..10 + body.len()]);
            if self.tamper == Tamper::BadCrc {
                crc ^= 0x8000;
            }
            let at = 10 + body.len();
            buf.pwrite_with(crc, at, BE).unwrap();
            if self.tamper == Tamper::FlipBodyBit {
                assert!(!body.is_empty(), "FlipBodyBit needs a nonempty body");
                buf[10] ^= 0x01;
            }
            buf
        }
    }

    impl Transport for MockDevice {
        fn send_raw(&mut self, raw: &[u8], _timeout: Duration) -> Result<()> {
            if raw.len() >= 12 && raw.pread_with::<u32>(0, BE).unwrap() == MAGIC {
                let tag: u16 = raw.pread_with(6, BE).unwrap();
                let opcode: u16 = raw.pread_with(8, BE).unwrap();
                let body = raw[10..raw.len() - 2].to_vec();
                self.frames.push((tag, opcode, body));

                let reply_body = self.reply_bodies.pop_front().unwrap_or_default();
                let reply = self.build_reply(tag, opcode, &reply_body);
                self.rx.extend(reply);
                if opcode == opcodes::DOWNLOAD {
                    // ready to receive: request a CRC-mode XMODEM transfer
                    self.rx.push_back(b'C');
                }
            } else if raw.first() == Some(&0x02) {
                self.blocks.push(raw[3..raw.len() - 2].to_vec());
                self.rx.push_back(0x06);
            } else if raw.len() == 1 && raw[0] == 0x04 {
                self.eot_seen = true;
                self.rx.push_back(0x06);
            }
            Ok(())
        }

        fn recv_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
            if self.rx.len() < len {
                return Err(Error::Timeout(timeout));
            }
            Ok(self.rx.drain(..len).collect())
        }
    }
}
