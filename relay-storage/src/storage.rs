//! The storage contract every backend implements.

use async_trait::async_trait;

use crate::{InputPeer, PeerUpdate, SessionData, StorageError};

/// Seconds a cached username→peer mapping stays valid. Usernames change
/// hands; after this window a lookup must go back to the network.
pub const USERNAMES_TTL: i64 = 8 * 60 * 60;

/// Per-entity position in the update stream, used to detect gaps after a
/// reconnect. `id` is 0 for the common state and a channel id otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateState {
    pub id: i64,
    pub pts: i32,
    pub qts: i32,
    pub date: i32,
    pub seq: i32,
}

/// A cached data-center address, keyed by `(dc_id, is_ipv6, is_media)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DcAddress {
    pub dc_id: u32,
    pub address: String,
    pub port: u16,
    pub is_ipv6: bool,
    pub is_media: bool,
    /// Whether this address came from the bootstrap table rather than a
    /// server-provided config or redirect.
    pub is_default_ip: bool,
}

/// DCs 1, 3 and 5 have no media counterpart; media requests for them use the
/// main address. Both cache reads and writes apply this.
pub fn normalize_media(dc_id: u32, media: bool) -> bool {
    !matches!(dc_id, 1 | 3 | 5) && media
}

/// Abstract persistence for one MTProto session: scalar login state, the
/// peer/username caches, per-entity update positions and learned DC
/// addresses.
///
/// Backends are chosen by constructing the one you want and passing it where
/// a `Storage` is expected; nothing here dispatches on inheritance.
///
/// Backends do not lock against concurrent writers beyond what `Send + Sync`
/// requires: the bulk-replace semantics of [`update_usernames`] lose data if
/// two tasks interleave writes, so funnel all writes through one path.
/// Concurrent reads are fine.
///
/// [`update_usernames`]: Storage::update_usernames
#[async_trait]
pub trait Storage: Send + Sync {
    /// Create the schema on first use, otherwise run pending migrations.
    async fn open(&self) -> Result<(), StorageError>;

    /// Flush state and refresh the session's `date` stamp.
    async fn save(&self) -> Result<(), StorageError>;

    /// Release the underlying handle, where the backend holds one. The
    /// embedded backend errors with [`StorageError::NotOpen`] afterwards
    /// until reopened; the remote backend's pool unwinds on its own.
    async fn close(&self) -> Result<(), StorageError>;

    /// Destroy the stored session record.
    async fn delete(&self) -> Result<(), StorageError>;

    async fn dc_id(&self) -> Result<u32, StorageError>;
    async fn set_dc_id(&self, value: u32) -> Result<(), StorageError>;

    async fn api_id(&self) -> Result<Option<i32>, StorageError>;
    async fn set_api_id(&self, value: i32) -> Result<(), StorageError>;

    async fn test_mode(&self) -> Result<bool, StorageError>;
    async fn set_test_mode(&self, value: bool) -> Result<(), StorageError>;

    /// The 256-byte shared secret produced by the key exchange, if one has
    /// been negotiated yet.
    async fn auth_key(&self) -> Result<Option<Vec<u8>>, StorageError>;
    async fn set_auth_key(&self, value: Option<&[u8]>) -> Result<(), StorageError>;

    /// Unix timestamp of the last `save`.
    async fn date(&self) -> Result<i64, StorageError>;
    async fn set_date(&self, value: i64) -> Result<(), StorageError>;

    async fn user_id(&self) -> Result<Option<i64>, StorageError>;
    async fn set_user_id(&self, value: i64) -> Result<(), StorageError>;

    async fn is_bot(&self) -> Result<bool, StorageError>;
    async fn set_is_bot(&self, value: bool) -> Result<(), StorageError>;

    /// Bulk-upsert observed peers. Fresh rows get a current `last_update_on`;
    /// existing rows are refreshed by the backend itself, so freshness does
    /// not depend on the caller.
    async fn update_peers(&self, peers: &[PeerUpdate]) -> Result<(), StorageError>;

    /// Replace the cached non-primary ("fragment") usernames for each listed
    /// peer: all previous rows for that peer id go away, the given ones come
    /// in.
    async fn update_usernames(&self, usernames: &[(i64, Vec<String>)]) -> Result<(), StorageError>;

    async fn get_peer_by_id(&self, id: i64) -> Result<InputPeer, StorageError>;

    /// Resolve a username, first against the primary peer rows, then against
    /// the fragment-username cache. Entries older than [`USERNAMES_TTL`]
    /// yield [`StorageError::Expired`].
    async fn get_peer_by_username(&self, username: &str) -> Result<InputPeer, StorageError>;

    async fn get_peer_by_phone_number(&self, phone_number: &str) -> Result<InputPeer, StorageError>;

    /// All stored update positions.
    async fn states(&self) -> Result<Vec<UpdateState>, StorageError>;

    /// Upsert one update position by its `id`.
    async fn update_state(&self, state: UpdateState) -> Result<(), StorageError>;

    /// Drop the update position for `id`.
    async fn remove_state(&self, id: i64) -> Result<(), StorageError>;

    /// Upsert a learned DC address (from a server config or a migration
    /// redirect). The media flag is normalized before writing.
    async fn update_dc_address(&self, dc: DcAddress) -> Result<(), StorageError>;

    /// Cached address for `(dc_id, is_ipv6, is_media)`, if any. Only
    /// production addresses live here; test-DC resolution never consults the
    /// cache.
    async fn get_dc_address(
        &self,
        dc_id: u32,
        is_ipv6: bool,
        is_media: bool,
    ) -> Result<Option<DcAddress>, StorageError>;

    async fn version(&self) -> Result<u32, StorageError>;
    async fn set_version(&self, value: u32) -> Result<(), StorageError>;

    /// Pack the scalar session state into a portable session string.
    ///
    /// Requires a negotiated auth key; exporting a keyless session is an
    /// error rather than a useless token.
    async fn export_session_string(&self) -> Result<String, StorageError> {
        let auth_key = self
            .auth_key()
            .await?
            .ok_or_else(|| StorageError::BadSession("no auth key to export".into()))?;
        let auth_key: [u8; 256] = auth_key.as_slice().try_into().map_err(|_| {
            StorageError::BadSession(format!("auth key must be 256 bytes, got {}", auth_key.len()))
        })?;
        let data = SessionData {
            dc_id: self.dc_id().await?,
            api_id: self.api_id().await?.unwrap_or(0),
            test_mode: self.test_mode().await?,
            auth_key,
            user_id: self.user_id().await?.unwrap_or(0),
            is_bot: self.is_bot().await?,
        };
        Ok(data.encode())
    }

    /// Seed the scalar session state from a session string (any supported
    /// layout).
    async fn import_session_string(&self, string: &str) -> Result<(), StorageError> {
        let data = SessionData::decode(string)?;
        self.set_dc_id(data.dc_id).await?;
        self.set_api_id(data.api_id).await?;
        self.set_test_mode(data.test_mode).await?;
        self.set_auth_key(Some(&data.auth_key)).await?;
        self.set_user_id(data.user_id).await?;
        self.set_is_bot(data.is_bot).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_flag_survives_only_on_media_dcs() {
        assert!(!normalize_media(1, true));
        assert!(normalize_media(2, true));
        assert!(!normalize_media(3, true));
        assert!(normalize_media(4, true));
        assert!(!normalize_media(5, true));
        assert!(!normalize_media(2, false));
    }
}
