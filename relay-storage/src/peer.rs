//! Cached peer records and their wire-ready references.

use std::fmt;
use std::str::FromStr;

use crate::StorageError;

/// Marked channel ids look like `-100xxxxxxxxxx`; subtracting from this
/// constant recovers the bare channel id the wire format wants.
const ZERO_CHANNEL_ID: i64 = -1_000_000_000_000;

/// The kind of peer a cached entry refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerType {
    User,
    Bot,
    Group,
    Channel,
    Supergroup,
}

impl PeerType {
    /// The type string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User       => "user",
            Self::Bot        => "bot",
            Self::Group      => "group",
            Self::Channel    => "channel",
            Self::Supergroup => "supergroup",
        }
    }
}

impl fmt::Display for PeerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeerType {
    type Err = StorageError;

    /// Anything but the five known type strings is a programming error on the
    /// write side and fails here rather than silently defaulting.
    fn from_str(s: &str) -> Result<Self, StorageError> {
        match s {
            "user"       => Ok(Self::User),
            "bot"        => Ok(Self::Bot),
            "group"      => Ok(Self::Group),
            "channel"    => Ok(Self::Channel),
            "supergroup" => Ok(Self::Supergroup),
            other        => Err(StorageError::UnknownPeerType(other.to_string())),
        }
    }
}

/// One observed peer, as fed to [`crate::Storage::update_peers`].
#[derive(Clone, Debug)]
pub struct PeerUpdate {
    pub id: i64,
    pub access_hash: i64,
    pub peer_type: PeerType,
    /// Primary username, if any. Stored lowercased.
    pub username: Option<String>,
    pub phone_number: Option<String>,
}

/// A wire-ready reference to a peer, resolved from the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputPeer {
    User { user_id: i64, access_hash: i64 },
    Chat { chat_id: i64 },
    Channel { channel_id: i64, access_hash: i64 },
}

/// Map a cached `(id, access_hash, type)` row to its wire-ready reference.
///
/// Users and bots are referenced by id plus access hash. Basic groups carry
/// no hash and store their id negated. Channels and supergroups store the
/// `-100…`-marked id, which is stripped here.
pub fn input_peer(id: i64, access_hash: i64, peer_type: PeerType) -> InputPeer {
    match peer_type {
        PeerType::User | PeerType::Bot => InputPeer::User { user_id: id, access_hash },
        PeerType::Group => InputPeer::Chat { chat_id: -id },
        PeerType::Channel | PeerType::Supergroup => InputPeer::Channel {
            channel_id: ZERO_CHANNEL_ID - id,
            access_hash,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_reference_keeps_id_and_hash() {
        assert_eq!(
            input_peer(4321, 99, PeerType::User),
            InputPeer::User { user_id: 4321, access_hash: 99 }
        );
        assert_eq!(
            input_peer(4321, 99, PeerType::Bot),
            InputPeer::User { user_id: 4321, access_hash: 99 }
        );
    }

    #[test]
    fn group_reference_negates_id_and_drops_hash() {
        assert_eq!(
            input_peer(-100200, 55, PeerType::Group),
            InputPeer::Chat { chat_id: 100200 }
        );
    }

    #[test]
    fn channel_reference_strips_marker() {
        assert_eq!(
            input_peer(-1_001_234_567_890, 7, PeerType::Channel),
            InputPeer::Channel { channel_id: 1_234_567_890, access_hash: 7 }
        );
    }

    #[test]
    fn unknown_type_string_fails_fast() {
        assert!(matches!(
            "gigagroup".parse::<PeerType>(),
            Err(StorageError::UnknownPeerType(_))
        ));
        assert_eq!("supergroup".parse::<PeerType>().unwrap(), PeerType::Supergroup);
    }
}
