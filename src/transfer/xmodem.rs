//! XMODEM-1K sender.
//!
//! Both bootstrap stages and the flash download path expect the `xmodem1k`
//! dialect: 1024-byte STX blocks, CRC-16 block check, 0xFF padding.
use std::time::Duration;

use super::{crc16, BlockTransfer};
use crate::error::{Error, Result, TransferError};
use crate::transport::Transport;

const STX: u8 = 0x02;
const EOT: u8 = 0x04;
const ACK: u8 = 0x06;
const NAK: u8 = 0x15;
const CAN: u8 = 0x18;
const CRC_REQUEST: u8 = b'C';

const BLOCK_SIZE: usize = 1024;
const PAD: u8 = 0xff;

const BYTE_TIMEOUT: Duration = Duration::from_secs(1);
const HANDSHAKE_POLLS: usize = 16;
const MAX_RETRIES: usize = 16;

pub struct Xmodem<'a, T: Transport> {
    transport: &'a mut T,
}

impl<'a, T: Transport> Xmodem<'a, T> {
    pub fn new(transport: &'a mut T) -> Self {
        Xmodem { transport }
    }

    /// Wait for the receiver to request a CRC-mode transfer.
    fn wait_handshake(&mut self) -> Result<()> {
        for _ in 0..HANDSHAKE_POLLS {
            match self.transport.recv_byte(BYTE_TIMEOUT) {
                Ok(CRC_REQUEST) => return Ok(()),
                Ok(other) => log::debug!("handshake: ignoring 0x{:02x}", other),
                Err(Error::Timeout(_)) => (),
                Err(e) => return Err(e),
            }
        }
        Err(TransferError::NoHandshake.into())
    }

    fn send_block(&mut self, seq: u8, data: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(3 + BLOCK_SIZE + 2);
        frame.push(STX);
        frame.push(seq);
        frame.push(!seq);
        frame.extend_from_slice(data);
        frame.resize(3 + BLOCK_SIZE, PAD);
        let crc = crc16(&frame[3..]);
        frame.extend_from_slice(&crc.to_be_bytes());

        let mut cancels = 0;
        for _ in 0..MAX_RETRIES {
            self.transport.send_raw(&frame, BYTE_TIMEOUT)?;
            match self.transport.recv_byte(BYTE_TIMEOUT) {
                Ok(ACK) => return Ok(()),
                Ok(NAK) => {
                    log::debug!("block {} NAKed, retransmitting", seq);
                    cancels = 0;
                }
                Ok(CAN) => {
                    cancels += 1;
                    if cancels >= 2 {
                        return Err(TransferError::Cancelled.into());
                    }
                }
                Ok(other) => {
                    log::debug!("block {}: unexpected 0x{:02x}, retransmitting", seq, other);
                    cancels = 0;
                }
                Err(Error::Timeout(_)) => cancels = 0,
                Err(e) => return Err(e),
            }
        }
        Err(TransferError::RetriesExhausted {
            block: seq,
            retries: MAX_RETRIES,
        }
        .into())
    }

    fn finish(&mut self) -> Result<()> {
        for _ in 0..MAX_RETRIES {
            self.transport.send_raw(&[EOT], BYTE_TIMEOUT)?;
            match self.transport.recv_byte(BYTE_TIMEOUT) {
                Ok(ACK) => return Ok(()),
                Ok(_) | Err(Error::Timeout(_)) => (),
                Err(e) => return Err(e),
            }
        }
        Err(TransferError::EotUnacknowledged.into())
    }
}

impl<T: Transport> BlockTransfer for Xmodem<'_, T> {
    fn send(&mut self, data: &[u8], progress: &mut dyn FnMut(usize, usize)) -> Result<()> {
        self.wait_handshake()?;
        let total = data.len().div_ceil(BLOCK_SIZE);
        for (i, chunk) in data.chunks(BLOCK_SIZE).enumerate() {
            // block numbering starts at 1 and wraps through 0
            self.send_block((i as u8).wrapping_add(1), chunk)?;
            progress(i + 1, total);
        }
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, TransferError};
    use crate::transport::testing::MockTransport;

    fn send(rx: &[u8], data: &[u8]) -> (MockTransport, Result<()>) {
        let mut mock = MockTransport::new(rx);
        let mut progress = Vec::new();
        let result = Xmodem::new(&mut mock).send(data, &mut |done, total| {
            progress.push((done, total));
        });
        (mock, result)
    }

    #[test]
    fn single_short_block() {
        let (mock, result) = send(&[CRC_REQUEST, ACK, ACK], b"hello");
        result.unwrap();

        assert_eq!(mock.writes.len(), 2);
        let frame = &mock.writes[0];
        assert_eq!(frame.len(), 3 + 1024 + 2);
        assert_eq!(frame[0], STX);
        assert_eq!(frame[1], 1);
        assert_eq!(frame[2], 0xfe);
        assert_eq!(&frame[3..8], b"hello");
        assert!(frame[8..1027].iter().all(|&b| b == PAD));
        let crc = crc16(&frame[3..1027]);
        assert_eq!(&frame[1027..], &crc.to_be_bytes());
        assert_eq!(mock.writes[1], vec![EOT]);
    }

    #[test]
    fn progress_counts_blocks() {
        let mut mock = MockTransport::new(&[CRC_REQUEST, ACK, ACK, ACK, ACK]);
        let mut seen = Vec::new();
        Xmodem::new(&mut mock)
            .send(&[0u8; 2500], &mut |done, total| seen.push((done, total)))
            .unwrap();
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn nak_triggers_retransmit() {
        let (mock, result) = send(&[CRC_REQUEST, NAK, ACK, ACK], b"x");
        result.unwrap();

        // block sent twice, then EOT
        assert_eq!(mock.writes.len(), 3);
        assert_eq!(mock.writes[0], mock.writes[1]);
        assert_eq!(mock.writes[2], vec![EOT]);
    }

    #[test]
    fn double_cancel_aborts() {
        let (_, result) = send(&[CRC_REQUEST, CAN, CAN], b"x");
        match result {
            Err(Error::Transfer(TransferError::Cancelled)) => (),
            other => panic!("expected cancellation, got {:?}", other.err()),
        }
    }

    #[test]
    fn missing_handshake() {
        let (mock, result) = send(&[], b"x");
        match result {
            Err(Error::Transfer(TransferError::NoHandshake)) => (),
            other => panic!("expected no handshake, got {:?}", other.err()),
        }
        assert!(mock.writes.is_empty());
    }

    #[test]
    fn block_numbering_wraps() {
        // 256 full blocks: numbering runs 1..=255, 0, 1
        let data = vec![0u8; 257 * 1024];
        let mut rx = vec![CRC_REQUEST];
        rx.extend(std::iter::repeat(ACK).take(258));
        let (mock, result) = send(&rx, &data);
        result.unwrap();

        assert_eq!(mock.writes.len(), 258);
        assert_eq!(mock.writes[254][1], 255);
        assert_eq!(mock.writes[255][1], 0);
        assert_eq!(mock.writes[256][1], 1);
    }

    #[test]
    fn empty_payload_sends_only_eot() {
        let (mock, result) = send(&[CRC_REQUEST, ACK], b"");
        result.unwrap();
        assert_eq!(mock.writes, vec![vec![EOT]]);
    }
}
