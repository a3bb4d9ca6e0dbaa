//! [MTProto Abridged] framing.
//!
//! The leanest encoding: a one-byte `0xef` tag at connect time, then each
//! packet is its length in 4-byte words, one byte when it fits, else `0x7f`
//! plus three little-endian bytes.
//!
//! [MTProto Abridged]: https://core.telegram.org/mtproto/mtproto-transports#abridged

use std::io;

use crate::tcp::Tcp;

pub struct Abridged {
    tcp: Tcp,
}

impl Abridged {
    pub(crate) fn new(tcp: Tcp) -> Self {
        Self { tcp }
    }

    /// Send the protocol tag. Runs once, straight after connect.
    pub(crate) async fn handshake(&self) -> io::Result<()> {
        self.tcp.send(&[0xef]).await
    }

    /// Send one framed payload. `data.len()` must be a multiple of 4.
    pub async fn send(&self, data: &[u8]) -> io::Result<()> {
        self.tcp.send(&encode(data)).await
    }

    /// Receive the next framed payload; `None` is a fatal disconnect.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        let head = self.tcp.recv(1).await?;
        let words = if head[0] < 0x7f {
            head[0] as usize
        } else {
            let ext = self.tcp.recv(3).await?;
            ext[0] as usize | (ext[1] as usize) << 8 | (ext[2] as usize) << 16
        };
        self.tcp.recv(words * 4).await
    }

    pub async fn close(&self) {
        self.tcp.close().await
    }
}

/// Parse one complete abridged frame. `None` if the buffer is truncated or
/// holds trailing bytes beyond the frame.
pub fn decode(frame: &[u8]) -> Option<Vec<u8>> {
    let (words, header_len) = match *frame.first()? {
        byte if byte < 0x7f => (byte as usize, 1),
        _ => {
            if frame.len() < 4 {
                return None;
            }
            (
                frame[1] as usize | (frame[2] as usize) << 8 | (frame[3] as usize) << 16,
                4,
            )
        }
    };
    let payload = frame.get(header_len..)?;
    (payload.len() == words * 4).then(|| payload.to_vec())
}

/// Frame `data` with the abridged length prefix. Header and payload go out
/// as one buffer so a send is a single locked write.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let words = data.len() / 4;
    let mut frame = Vec::with_capacity(data.len() + 4);
    if words < 0x7f {
        frame.push(words as u8);
    } else {
        frame.push(0x7f);
        frame.push((words & 0xff) as u8);
        frame.push(((words >> 8) & 0xff) as u8);
        frame.push(((words >> 16) & 0xff) as u8);
    }
    frame.extend_from_slice(data);
    frame
}
