//! Proxied connection paths: SOCKS4, SOCKS5 and HTTP CONNECT.
//!
//! All three connectors are natively async, so a slow proxy handshake only
//! ever suspends its own task, never the reactor.

use std::io;
use std::net::SocketAddr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};

/// Proxy configuration for outbound DC connections.
#[derive(Clone, Debug)]
pub enum Proxy {
    /// SOCKS5, with optional username/password authentication.
    Socks5 { addr: String, auth: Option<(String, String)> },
    /// SOCKS4, identified by a user id string (often empty).
    Socks4 { addr: String, user_id: String },
    /// Plain HTTP CONNECT, with optional basic authentication.
    Http { addr: String, auth: Option<(String, String)> },
}

impl Proxy {
    /// An unauthenticated SOCKS5 proxy.
    pub fn socks5(addr: impl Into<String>) -> Self {
        Self::Socks5 { addr: addr.into(), auth: None }
    }

    /// A SOCKS5 proxy with username/password authentication.
    pub fn socks5_with_auth(
        addr: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::Socks5 { addr: addr.into(), auth: Some((username.into(), password.into())) }
    }

    /// Tunnel a TCP connection to `target` through this proxy.
    pub(crate) async fn connect(&self, target: SocketAddr) -> io::Result<TcpStream> {
        match self {
            Proxy::Socks5 { addr, auth } => {
                log::info!("[proxy] socks5 {addr} → {target}");
                let stream = match auth {
                    None => Socks5Stream::connect(addr.as_str(), target).await,
                    Some((user, pass)) => {
                        Socks5Stream::connect_with_password(addr.as_str(), target, user, pass)
                            .await
                    }
                }
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                Ok(stream.into_inner())
            }
            Proxy::Socks4 { addr, user_id } => {
                log::info!("[proxy] socks4 {addr} → {target}");
                let stream = Socks4Stream::connect_with_userid(addr.as_str(), target, user_id)
                    .await
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                Ok(stream.into_inner())
            }
            Proxy::Http { addr, auth } => {
                log::info!("[proxy] http connect {addr} → {target}");
                http_connect(addr, target, auth.as_ref()).await
            }
        }
    }
}

/// Minimal HTTP CONNECT handshake: one request, check the status line, drain
/// the remaining response headers, hand the stream back.
async fn http_connect(
    proxy: &str,
    target: SocketAddr,
    auth: Option<&(String, String)>,
) -> io::Result<TcpStream> {
    let stream = TcpStream::connect(proxy).await?;
    let mut stream = BufReader::new(stream);

    let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
    if let Some((user, pass)) = auth {
        let credentials = STANDARD.encode(format!("{user}:{pass}"));
        request.push_str(&format!("Proxy-Authorization: Basic {credentials}\r\n"));
    }
    request.push_str("\r\n");
    stream.get_mut().write_all(request.as_bytes()).await?;

    let mut status = String::new();
    stream.read_line(&mut status).await?;
    let accepted = status
        .split_whitespace()
        .nth(1)
        .map(|code| code.starts_with('2'))
        .unwrap_or(false);
    if !accepted {
        return Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            format!("proxy refused CONNECT: {}", status.trim()),
        ));
    }

    loop {
        let mut line = String::new();
        if stream.read_line(&mut line).await? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }
    Ok(stream.into_inner())
}
