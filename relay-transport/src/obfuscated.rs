//! Obfuscated intermediate transport.
//!
//! Intermediate framing under two persistent AES-256-CTR keystreams seeded
//! from a random 64-byte handshake header, so traffic looks like noise to
//! deep-packet inspection. Used where plain MTProto framing gets shaped or
//! blocked.

use std::io;

use aes::Aes256;
use aes::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr128BE;
use tokio::sync::Mutex;

use crate::intermediate;
use crate::tcp::Tcp;

type AesCtr = Ctr128BE<Aes256>;

/// First-dword values the handshake header must avoid: HTTP verbs a
/// middlebox would recognise, and the plain intermediate tag.
const RESERVED: [[u8; 4]; 5] = [*b"HEAD", *b"POST", *b"GET ", *b"OPTI", [0xee; 4]];

pub struct Obfuscated {
    tcp: Tcp,
    /// Outgoing keystream. Encrypting and writing happen under one lock so
    /// the stream position stays aligned with the wire.
    enc: Mutex<AesCtr>,
    dec: AesCtr,
}

impl Obfuscated {
    /// Generate the 64-byte header, self-encrypt its tail and send it.
    ///
    /// Both keystreams advance continuously from here on; they are never
    /// reset between messages.
    pub(crate) async fn handshake(tcp: Tcp) -> io::Result<Self> {
        let mut header = generate_header()?;
        let (mut enc, dec) = derive_ciphers(&header);

        // The last 8 header bytes go out encrypted; everything before them
        // stays plaintext random. Running the cipher over the whole header
        // leaves its position at byte 64, where the payload stream starts.
        let mut encrypted = header;
        enc.apply_keystream(&mut encrypted);
        header[56..64].copy_from_slice(&encrypted[56..64]);

        tcp.send(&header).await?;
        log::debug!("[obfuscated] handshake sent");
        Ok(Self { tcp, enc: Mutex::new(enc), dec })
    }

    /// Send one intermediate-framed payload through the outgoing keystream.
    pub async fn send(&self, data: &[u8]) -> io::Result<()> {
        let mut frame = intermediate::encode(data);
        let mut enc = self.enc.lock().await;
        enc.apply_keystream(&mut frame);
        self.tcp.send(&frame).await
    }

    /// Receive and de-obfuscate the next frame; `None` is a fatal disconnect.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        let mut head = self.tcp.recv(4).await?;
        self.dec.apply_keystream(&mut head);
        let len = u32::from_le_bytes(head.try_into().ok()?) as usize;

        let mut payload = self.tcp.recv(len).await?;
        self.dec.apply_keystream(&mut payload);
        Some(payload)
    }

    pub async fn close(&self) {
        self.tcp.close().await
    }
}

/// Draw random 64-byte headers until one is protocol-clean, then stamp the
/// intermediate tag into bytes 56..60.
///
/// No retry cap: each draw passes with probability ≈ 255/256, so the loop is
/// all but guaranteed to exit within a couple of iterations.
fn generate_header() -> io::Result<[u8; 64]> {
    let mut header = [0u8; 64];
    loop {
        getrandom::getrandom(&mut header)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let head: [u8; 4] = header[..4].try_into().unwrap();
        if header[0] != 0xef && !RESERVED.contains(&head) && header[4..8] != [0u8; 4] {
            break;
        }
    }
    header[56..60].copy_from_slice(&[0xee; 4]);
    Ok(header)
}

/// Derive the two directional keystreams from the handshake header.
///
/// Outgoing key/iv are `header[8..40]`/`header[40..56]`; incoming come from
/// the same 48 bytes reversed, split 32/16.
fn derive_ciphers(header: &[u8; 64]) -> (AesCtr, AesCtr) {
    let enc_key: [u8; 32] = header[8..40].try_into().unwrap();
    let enc_iv: [u8; 16] = header[40..56].try_into().unwrap();

    let mut reversed = [0u8; 48];
    for (dst, src) in reversed.iter_mut().zip(header[8..56].iter().rev()) {
        *dst = *src;
    }
    let dec_key: [u8; 32] = reversed[..32].try_into().unwrap();
    let dec_iv: [u8; 16] = reversed[32..].try_into().unwrap();

    (
        AesCtr::new(&enc_key.into(), &enc_iv.into()),
        AesCtr::new(&dec_key.into(), &dec_iv.into()),
    )
}
