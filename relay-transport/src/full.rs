//! [MTProto Full] framing: length, sequence number and CRC-32.
//!
//! No connect-time tag; the format is recognised by its first byte being
//! neither `0xef` nor `0xee`. Each direction keeps its own sequence counter
//! starting at zero.
//!
//! [MTProto Full]: https://core.telegram.org/mtproto/mtproto-transports#full

use std::io;

use tokio::sync::Mutex;

use crate::tcp::Tcp;

pub struct Full {
    tcp: Tcp,
    /// Next outgoing sequence number. Held across the write so frame order
    /// on the wire always matches sequence order.
    send_seq: Mutex<u32>,
    recv_seq: u32,
}

impl Full {
    pub(crate) fn new(tcp: Tcp) -> Self {
        Self { tcp, send_seq: Mutex::new(0), recv_seq: 0 }
    }

    /// Send one framed payload.
    pub async fn send(&self, data: &[u8]) -> io::Result<()> {
        let mut seq = self.send_seq.lock().await;
        let frame = pack(data, *seq);
        self.tcp.send(&frame).await?;
        *seq = seq.wrapping_add(1);
        Ok(())
    }

    /// Receive and verify the next frame.
    ///
    /// A corrupt frame and a dead socket both come back as `None`; either
    /// way the connection must be rebuilt. The log tells them apart when it
    /// matters.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        let head = self.tcp.recv(4).await?;
        let total = u32::from_le_bytes(head.as_slice().try_into().ok()?) as usize;
        if total < 12 {
            log::warn!("[full] frame too short ({total} bytes)");
            return None;
        }

        let mut frame = head;
        frame.extend(self.tcp.recv(total - 4).await?);

        let seq = self.recv_seq;
        self.recv_seq = self.recv_seq.wrapping_add(1);
        match unpack(&frame, seq) {
            Some(payload) => Some(payload),
            None => {
                log::warn!("[full] checksum or sequence mismatch on frame {seq}");
                None
            }
        }
    }

    pub async fn close(&self) {
        self.tcp.close().await
    }
}

/// Build one full-format frame: `len ‖ seq ‖ payload ‖ crc32`, all fields
/// little-endian, with the checksum covering everything before it.
pub fn pack(data: &[u8], seq: u32) -> Vec<u8> {
    let total = (data.len() + 12) as u32;
    let mut frame = Vec::with_capacity(total as usize);
    frame.extend_from_slice(&total.to_le_bytes());
    frame.extend_from_slice(&seq.to_le_bytes());
    frame.extend_from_slice(data);
    let crc = crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Validate a complete frame against `expected_seq` and return its payload.
/// Any length, checksum or sequence mismatch yields `None`.
pub fn unpack(frame: &[u8], expected_seq: u32) -> Option<Vec<u8>> {
    if frame.len() < 12 {
        return None;
    }
    let (body, crc_bytes) = frame.split_at(frame.len() - 4);
    let expected_crc = u32::from_le_bytes(crc_bytes.try_into().ok()?);
    if crc32(body) != expected_crc {
        return None;
    }
    let declared = u32::from_le_bytes(body[..4].try_into().ok()?) as usize;
    if declared != frame.len() {
        return None;
    }
    let seq = u32::from_le_bytes(body[4..8].try_into().ok()?);
    if seq != expected_seq {
        return None;
    }
    Some(body[8..].to_vec())
}

/// CRC-32 over the IEEE 802.3 polynomial.
pub fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0xedb88320;
    let mut crc: u32 = 0xffffffff;
    for &byte in data {
        let mut b = byte as u32;
        for _ in 0..8 {
            let mix = (crc ^ b) & 1;
            crc >>= 1;
            if mix != 0 {
                crc ^= POLY;
            }
            b >>= 1;
        }
    }
    crc ^ 0xffffffff
}
