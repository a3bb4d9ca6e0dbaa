//! Error type shared by every storage backend.

use std::{fmt, io};

/// The error type returned by every [`crate::Storage`] operation.
///
/// [`NotFound`] and [`Expired`] are both cache misses: the caller should
/// re-resolve the peer over the network, never treat them as fatal to the
/// session.
///
/// [`NotFound`]: StorageError::NotFound
/// [`Expired`]: StorageError::Expired
#[derive(Debug)]
pub enum StorageError {
    /// The requested entry is not cached.
    NotFound(String),
    /// The entry is cached but older than its freshness window.
    Expired(String),
    /// A stored peer row carries a type string this version does not know.
    UnknownPeerType(String),
    /// A session string or stored session field has an invalid layout.
    BadSession(String),
    /// The storage was used before `open()` or after `close()`.
    NotOpen,
    /// Underlying I/O failure.
    Io(io::Error),
    /// SQLite error.
    #[cfg(feature = "sqlite")]
    Sqlite(rusqlite::Error),
    /// MongoDB driver error.
    #[cfg(feature = "mongo")]
    Mongo(mongodb::error::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what)        => write!(f, "not found: {what}"),
            Self::Expired(what)         => write!(f, "expired: {what}"),
            Self::UnknownPeerType(ty)   => write!(f, "unknown peer type: {ty}"),
            Self::BadSession(why)       => write!(f, "bad session data: {why}"),
            Self::NotOpen               => write!(f, "storage is not open"),
            Self::Io(e)                 => write!(f, "I/O error: {e}"),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(e)             => write!(f, "sqlite error: {e}"),
            #[cfg(feature = "mongo")]
            Self::Mongo(e)              => write!(f, "mongodb error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self { Self::Sqlite(e) }
}

#[cfg(feature = "mongo")]
impl From<mongodb::error::Error> for StorageError {
    fn from(e: mongodb::error::Error) -> Self { Self::Mongo(e) }
}

impl StorageError {
    /// Returns `true` for the two cache-miss conditions (`NotFound`,
    /// `Expired`) that a caller should answer with a live network lookup.
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Expired(_))
    }
}
