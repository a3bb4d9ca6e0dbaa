//! Per-DC connection with bounded reconnection.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use relay_storage::Storage;

use crate::dc::DataCenter;
use crate::errors::ConnectionError;
use crate::proxy::Proxy;
use crate::transport::{Mode, Transport};

const MAX_CONNECTION_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// One logical connection to a DC.
///
/// Owns at most one live [`Transport`]. [`connect`] retries transport
/// creation a bounded number of times and then fails for good; whether to
/// build a new `Connection` is the caller's decision. A `None` out of
/// [`recv`] means the transport died; there is no auto-reconnect at this
/// layer.
///
/// [`connect`]: Connection::connect
/// [`recv`]: Connection::recv
pub struct Connection {
    dc_id: u32,
    test_mode: bool,
    ipv6: bool,
    alt_port: bool,
    media: bool,
    mode: Mode,
    proxy: Option<Proxy>,
    storage: Arc<dyn Storage>,
    transport: Option<Transport>,
}

impl Connection {
    pub fn new(
        storage: Arc<dyn Storage>,
        dc_id: u32,
        test_mode: bool,
        ipv6: bool,
        media: bool,
    ) -> Self {
        Self {
            dc_id,
            test_mode,
            ipv6,
            alt_port: false,
            media,
            mode: Mode::default(),
            proxy: None,
            storage,
            transport: None,
        }
    }

    /// Select a non-default framing [`Mode`].
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Route through a proxy.
    pub fn with_proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Dial port 5222 instead of 443.
    pub fn with_alt_port(mut self) -> Self {
        self.alt_port = true;
        self
    }

    /// Resolve the DC address and establish a transport, retrying up to
    /// three times with a second between attempts.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        let address = DataCenter::resolve(
            self.storage.as_ref(),
            self.dc_id,
            self.test_mode,
            self.ipv6,
            self.alt_port,
            self.media,
        )
        .await?;

        let mode = self.mode;
        let proxy = self.proxy.clone();
        let transport = connect_with(MAX_CONNECTION_ATTEMPTS, || {
            let proxy = proxy.clone();
            async move { Transport::connect(mode, address, proxy.as_ref()).await }
        })
        .await?;

        log::info!("[connection] connected to DC{} ({address})", self.dc_id);
        self.transport = Some(transport);
        Ok(())
    }

    /// Send one payload over the live transport.
    pub async fn send(&self, data: &[u8]) -> Result<(), ConnectionError> {
        match &self.transport {
            Some(transport) => Ok(transport.send(data).await?),
            None => Err(ConnectionError::NotConnected),
        }
    }

    /// Receive the next payload. `None` means the transport is dead (EOF,
    /// timeout, I/O error or a corrupt full-format frame). Tear this
    /// connection down and build a fresh one.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        match &mut self.transport {
            Some(transport) => transport.recv().await,
            None => None,
        }
    }

    /// Tear the transport down. Fine to call repeatedly, or before any
    /// transport was ever created.
    pub async fn close(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.close().await;
            log::info!("[connection] DC{} closed", self.dc_id);
        }
    }

    /// Whether a transport is currently attached.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }
}

/// Run `dial` up to `attempts` times, sleeping between failures.
///
/// Each attempt starts from a fresh transport; a partially-connected one is
/// dropped (socket and all) before the next try.
async fn connect_with<F, Fut>(attempts: u32, mut dial: F) -> Result<Transport, ConnectionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<Transport>>,
{
    for attempt in 1..=attempts {
        match dial().await {
            Ok(transport) => return Ok(transport),
            Err(e) => {
                log::warn!("[connection] attempt {attempt}/{attempts} failed: {e}");
                sleep(RETRY_DELAY).await;
            }
        }
    }
    Err(ConnectionError::ConnectionFailed { attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_storage::SqliteStorage;

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_attempts_with_backoff() {
        let started = tokio::time::Instant::now();
        let mut dials = 0u32;

        let result = connect_with(MAX_CONNECTION_ATTEMPTS, || {
            dials += 1;
            async { Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")) }
        })
        .await;

        match result.err().expect("dialing must fail") {
            ConnectionError::ConnectionFailed { attempts } => assert_eq!(attempts, 3),
            other => panic!("expected ConnectionFailed, got {other:?}"),
        }
        assert_eq!(dials, 3);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn close_is_idempotent_without_a_transport() {
        let storage = Arc::new(SqliteStorage::memory());
        let mut connection = Connection::new(storage, 2, false, false, false);
        assert!(!connection.is_connected());
        connection.close().await;
        connection.close().await;
    }

    #[tokio::test]
    async fn send_and_recv_require_a_transport() {
        let storage = Arc::new(SqliteStorage::memory());
        let mut connection = Connection::new(storage, 2, false, false, false);
        assert!(matches!(
            connection.send(b"data").await,
            Err(ConnectionError::NotConnected)
        ));
        assert_eq!(connection.recv().await, None);
    }
}
