//! Transport selection and dispatch.

use std::io;
use std::net::SocketAddr;

use crate::abridged::Abridged;
use crate::full::Full;
use crate::intermediate::Intermediate;
use crate::obfuscated::Obfuscated;
use crate::proxy::Proxy;
use crate::tcp::Tcp;

/// Which on-wire framing to speak. Negotiated implicitly by the first bytes
/// sent after connect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    Abridged,
    Intermediate,
    /// Intermediate framing under an AES-CTR obfuscation layer. The default:
    /// hardest for middleboxes to fingerprint.
    #[default]
    ObfuscatedIntermediate,
    /// Length + sequence + CRC-32. The only variant with link-level
    /// integrity checking.
    Full,
}

/// One live framed connection to a DC.
///
/// `send` takes `&self` and serializes internally; `recv` takes `&mut self`
/// and expects a single reader loop.
pub enum Transport {
    Abridged(Abridged),
    Intermediate(Intermediate),
    ObfuscatedIntermediate(Obfuscated),
    Full(Full),
}

impl Transport {
    /// Open a (possibly proxied) TCP stream and run the variant's handshake.
    pub async fn connect(mode: Mode, addr: SocketAddr, proxy: Option<&Proxy>) -> io::Result<Self> {
        let tcp = Tcp::connect(addr, proxy).await?;
        log::debug!("[transport] {mode:?} connected to {addr}");
        match mode {
            Mode::Abridged => {
                let transport = Abridged::new(tcp);
                transport.handshake().await?;
                Ok(Self::Abridged(transport))
            }
            Mode::Intermediate => {
                let transport = Intermediate::new(tcp);
                transport.handshake().await?;
                Ok(Self::Intermediate(transport))
            }
            Mode::ObfuscatedIntermediate => {
                Ok(Self::ObfuscatedIntermediate(Obfuscated::handshake(tcp).await?))
            }
            Mode::Full => Ok(Self::Full(Full::new(tcp))),
        }
    }

    /// Send one framed payload.
    pub async fn send(&self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Abridged(t) => t.send(data).await,
            Self::Intermediate(t) => t.send(data).await,
            Self::ObfuscatedIntermediate(t) => t.send(data).await,
            Self::Full(t) => t.send(data).await,
        }
    }

    /// Receive the next framed payload. `None` means this transport is done
    /// for (EOF, timeout, I/O failure or, on [`Mode::Full`], corruption) and
    /// must be discarded.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        match self {
            Self::Abridged(t) => t.recv().await,
            Self::Intermediate(t) => t.recv().await,
            Self::ObfuscatedIntermediate(t) => t.recv().await,
            Self::Full(t) => t.recv().await,
        }
    }

    pub async fn close(&self) {
        match self {
            Self::Abridged(t) => t.close().await,
            Self::Intermediate(t) => t.close().await,
            Self::ObfuscatedIntermediate(t) => t.close().await,
            Self::Full(t) => t.close().await,
        }
    }
}
