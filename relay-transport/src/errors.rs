//! Error types for relay-transport.

use std::{fmt, io};

use relay_storage::StorageError;

/// Failure to establish or use a [`crate::Connection`].
#[derive(Debug)]
pub enum ConnectionError {
    /// Every connection attempt failed. Final at this layer: whether to try
    /// again is the caller's call.
    ConnectionFailed { attempts: u32 },
    /// `send` was called with no live transport.
    NotConnected,
    /// The DC id has no known address for the requested flavor.
    UnknownDc(u32),
    /// A cached address failed to parse.
    BadAddress(String),
    /// Storage failed while resolving the DC address.
    Storage(StorageError),
    /// Transport-level I/O failure.
    Io(io::Error),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { attempts } => {
                write!(f, "failed to connect after {attempts} attempt(s)")
            }
            Self::NotConnected => write!(f, "connection is not established"),
            Self::UnknownDc(dc_id) => write!(f, "no known address for DC {dc_id}"),
            Self::BadAddress(addr) => write!(f, "malformed DC address: {addr}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<StorageError> for ConnectionError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
