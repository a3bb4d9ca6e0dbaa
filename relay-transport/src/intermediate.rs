//! [MTProto Intermediate] framing.
//!
//! A four-byte `0xeeeeeeee` tag at connect time, then each packet is a
//! 4-byte little-endian byte length followed by the payload. Friendlier than
//! Abridged to middleboxes that inspect the first byte.
//!
//! [MTProto Intermediate]: https://core.telegram.org/mtproto/mtproto-transports#intermediate

use std::io;

use crate::tcp::Tcp;

pub struct Intermediate {
    tcp: Tcp,
}

impl Intermediate {
    pub(crate) fn new(tcp: Tcp) -> Self {
        Self { tcp }
    }

    /// Send the protocol tag. Runs once, straight after connect.
    pub(crate) async fn handshake(&self) -> io::Result<()> {
        self.tcp.send(&[0xee; 4]).await
    }

    /// Send one framed payload.
    pub async fn send(&self, data: &[u8]) -> io::Result<()> {
        self.tcp.send(&encode(data)).await
    }

    /// Receive the next framed payload; `None` is a fatal disconnect.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        let head = self.tcp.recv(4).await?;
        let len = u32::from_le_bytes(head.try_into().ok()?) as usize;
        self.tcp.recv(len).await
    }

    pub async fn close(&self) {
        self.tcp.close().await
    }
}

/// Parse one complete intermediate frame. `None` if the buffer is truncated
/// or holds trailing bytes beyond the frame.
pub fn decode(frame: &[u8]) -> Option<Vec<u8>> {
    let len = u32::from_le_bytes(frame.get(..4)?.try_into().ok()?) as usize;
    let payload = frame.get(4..)?;
    (payload.len() == len).then(|| payload.to_vec())
}

/// Frame `data` with the 4-byte little-endian length prefix.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(data.len() + 4);
    frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
    frame.extend_from_slice(data);
    frame
}
