//! Raw TCP layer shared by every framing variant.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::proxy::Proxy;

/// Aggregate timeout over connection establishment, proxy handshake included.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-call timeout for one `send`.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-call timeout while accumulating one `recv`. Generous: the server only
/// speaks when it has something to say.
const RECV_TIMEOUT: Duration = Duration::from_secs(90);

/// A connected TCP stream.
///
/// The write half sits behind a lock so concurrent senders never interleave
/// partial frames. The read half is unlocked: exactly one reader loop per
/// connection is assumed, and concurrent `recv` callers are unsupported.
pub struct Tcp {
    reader: OwnedReadHalf,
    writer: Mutex<OwnedWriteHalf>,
}

impl Tcp {
    /// Connect to `addr`, optionally tunnelling through `proxy`. The socket
    /// family follows the address; keepalive and no-delay are set on success.
    pub async fn connect(addr: SocketAddr, proxy: Option<&Proxy>) -> io::Result<Tcp> {
        let stream = timeout(CONNECT_TIMEOUT, async {
            match proxy {
                Some(proxy) => proxy.connect(addr).await,
                None => direct_connect(addr).await,
            }
        })
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;

        configure(&stream)?;
        let (reader, writer) = stream.into_split();
        Ok(Tcp { reader, writer: Mutex::new(writer) })
    }

    /// Write all of `data` to the socket as one locked unit.
    pub async fn send(&self, data: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        timeout(SEND_TIMEOUT, writer.write_all(data))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "send timed out"))?
    }

    /// Read exactly `len` bytes, accumulating across socket reads.
    ///
    /// Any I/O error, timeout or EOF yields `None`, which is fatal for this
    /// transport instance: the stream may have died mid-frame, so the caller
    /// must discard it and reconnect. Cancelling the returned future has the
    /// same effect: a partial frame cannot be resumed.
    pub async fn recv(&mut self, len: usize) -> Option<Vec<u8>> {
        let mut data = vec![0u8; len];
        let mut filled = 0usize;
        while filled < len {
            match timeout(RECV_TIMEOUT, self.reader.read(&mut data[filled..])).await {
                Ok(Ok(0)) => return None,
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) => {
                    log::debug!("[tcp] recv failed after {filled}/{len} bytes: {e}");
                    return None;
                }
                Err(_) => {
                    log::debug!("[tcp] recv timed out after {filled}/{len} bytes");
                    return None;
                }
            }
        }
        Some(data)
    }

    /// Shut the write half down. Safe to call more than once.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

async fn direct_connect(addr: SocketAddr) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv6() { TcpSocket::new_v6()? } else { TcpSocket::new_v4()? };
    socket.connect(addr).await
}

fn configure(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let keepalive = TcpKeepalive::new().with_time(Duration::from_secs(60));
    SockRef::from(stream).set_tcp_keepalive(&keepalive)?;
    Ok(())
}
