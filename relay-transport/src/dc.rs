//! Data-center address resolution.
//!
//! Cached addresses (learned from server configs and migration redirects)
//! win over the hardcoded bootstrap tables. Test deployments are the
//! exception: they are never cached, so resolution in test mode goes
//! straight to the table.

use std::net::{IpAddr, SocketAddr};

use relay_storage::{Storage, normalize_media};

use crate::errors::ConnectionError;

const PORT: u16 = 443;
/// Fallback for networks that filter 443; the DCs also listen here.
const PORT_ALT: u16 = 5222;
const PORT_TEST: u16 = 80;

const PROD: &[(u32, &str)] = &[
    (1, "149.154.175.53"),
    (2, "149.154.167.51"),
    (3, "149.154.175.100"),
    (4, "149.154.167.91"),
    (5, "91.108.56.130"),
];

const PROD_MEDIA: &[(u32, &str)] = &[(2, "149.154.167.151"), (4, "149.154.164.250")];

const TEST: &[(u32, &str)] = &[
    (1, "149.154.175.10"),
    (2, "149.154.167.40"),
    (3, "149.154.175.117"),
];

const PROD_V6: &[(u32, &str)] = &[
    (1, "2001:b28:f23d:f001::a"),
    (2, "2001:67c:4e8:f002::a"),
    (3, "2001:b28:f23d:f003::a"),
    (4, "2001:67c:4e8:f004::a"),
    (5, "2001:b28:f23f:f005::a"),
];

const PROD_V6_MEDIA: &[(u32, &str)] = &[(2, "2001:67c:4e8:f002::b"), (4, "2001:67c:4e8:f004::b")];

const TEST_V6: &[(u32, &str)] = &[
    (1, "2001:b28:f23d:f001::e"),
    (2, "2001:67c:4e8:f002::e"),
    (3, "2001:b28:f23d:f003::e"),
];

/// Resolver from a DC id (plus flavor flags) to a socket address.
pub struct DataCenter;

impl DataCenter {
    /// Resolve the address to dial for `dc_id`.
    ///
    /// Flags are normalized first: DCs 1/3/5 have no media deployment and
    /// DCs 4/5 no test deployment, so those combinations quietly fall back
    /// to the plain flavor. Production lookups consult the storage cache
    /// before the bootstrap table; test lookups skip the cache entirely.
    pub async fn resolve(
        storage: &dyn Storage,
        dc_id: u32,
        test_mode: bool,
        ipv6: bool,
        alt_port: bool,
        media: bool,
    ) -> Result<SocketAddr, ConnectionError> {
        let media = normalize_media(dc_id, media);
        let test_mode = test_mode && !matches!(dc_id, 4 | 5);

        if !test_mode {
            if let Some(cached) = storage.get_dc_address(dc_id, ipv6, media).await? {
                let ip: IpAddr = cached
                    .address
                    .parse()
                    .map_err(|_| ConnectionError::BadAddress(cached.address.clone()))?;
                log::debug!("[dc] DC{dc_id} resolved from cache: {ip}:{}", cached.port);
                return Ok(SocketAddr::new(ip, cached.port));
            }
        }

        let ip = if test_mode {
            lookup(if ipv6 { TEST_V6 } else { TEST }, dc_id)
        } else if ipv6 {
            media
                .then(|| lookup(PROD_V6_MEDIA, dc_id))
                .flatten()
                .or_else(|| lookup(PROD_V6, dc_id))
        } else {
            media
                .then(|| lookup(PROD_MEDIA, dc_id))
                .flatten()
                .or_else(|| lookup(PROD, dc_id))
        }
        .ok_or(ConnectionError::UnknownDc(dc_id))?;

        let port = if test_mode {
            PORT_TEST
        } else if alt_port {
            PORT_ALT
        } else {
            PORT
        };

        let ip: IpAddr = ip
            .parse()
            .map_err(|_| ConnectionError::BadAddress(ip.to_string()))?;
        Ok(SocketAddr::new(ip, port))
    }
}

fn lookup(table: &[(u32, &'static str)], dc_id: u32) -> Option<&'static str> {
    table.iter().find(|(id, _)| *id == dc_id).map(|(_, ip)| *ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_storage::{DcAddress, SqliteStorage};

    async fn storage() -> SqliteStorage {
        let storage = SqliteStorage::memory();
        storage.open().await.unwrap();
        storage
    }

    #[tokio::test]
    async fn bootstrap_table_serves_uncached_dcs() {
        let storage = storage().await;
        let addr = DataCenter::resolve(&storage, 2, false, false, false, false)
            .await
            .unwrap();
        assert_eq!(addr.to_string(), "149.154.167.51:443");
    }

    #[tokio::test]
    async fn cached_address_wins_over_bootstrap() {
        let storage = storage().await;
        storage
            .update_dc_address(DcAddress {
                dc_id: 2,
                address: "149.154.167.99".into(),
                port: 443,
                is_ipv6: false,
                is_media: false,
                is_default_ip: false,
            })
            .await
            .unwrap();

        let addr = DataCenter::resolve(&storage, 2, false, false, false, false)
            .await
            .unwrap();
        assert_eq!(addr.to_string(), "149.154.167.99:443");
    }

    #[tokio::test]
    async fn test_mode_skips_the_cache() {
        let storage = storage().await;
        storage
            .update_dc_address(DcAddress {
                dc_id: 2,
                address: "1.2.3.4".into(),
                port: 443,
                is_ipv6: false,
                is_media: false,
                is_default_ip: false,
            })
            .await
            .unwrap();

        let addr = DataCenter::resolve(&storage, 2, true, false, false, false)
            .await
            .unwrap();
        assert_eq!(addr.to_string(), "149.154.167.40:80");
    }

    #[tokio::test]
    async fn media_falls_back_where_no_media_deployment_exists() {
        let storage = storage().await;
        // DC 2 has a media twin…
        let media = DataCenter::resolve(&storage, 2, false, false, false, true)
            .await
            .unwrap();
        assert_eq!(media.to_string(), "149.154.167.151:443");
        // …DC 1 does not.
        let plain = DataCenter::resolve(&storage, 1, false, false, false, true)
            .await
            .unwrap();
        assert_eq!(plain.to_string(), "149.154.175.53:443");
    }

    #[tokio::test]
    async fn dc5_never_serves_test_traffic() {
        let storage = storage().await;
        let addr = DataCenter::resolve(&storage, 5, true, false, false, false)
            .await
            .unwrap();
        assert_eq!(addr.to_string(), "91.108.56.130:443");
    }

    #[tokio::test]
    async fn alt_port_and_ipv6_combine() {
        let storage = storage().await;
        let addr = DataCenter::resolve(&storage, 4, false, true, true, false)
            .await
            .unwrap();
        assert!(addr.is_ipv6());
        assert_eq!(addr.port(), 5222);
    }

    #[tokio::test]
    async fn unknown_dc_fails() {
        let storage = storage().await;
        assert!(matches!(
            DataCenter::resolve(&storage, 9, false, false, false, false).await,
            Err(ConnectionError::UnknownDc(9))
        ));
    }
}
