//! # relay: MTProto transport & session persistence
//!
//! `relay` bundles the two load-bearing layers of an MTProto client:
//!
//! | Sub-crate         | Role                                               |
//! |-------------------|----------------------------------------------------|
//! | `relay-transport` | Byte-exact wire framing, proxies, connection retry |
//! | `relay-storage`   | Session scalars, peer cache, DC cache, update state |
//!
//! A client built on top of these asks [`storage`] for the cached DC address
//! and auth key, opens a [`Connection`], and exchanges opaque encrypted
//! frames with `send`/`recv`. Peers, usernames and DC redirects observed in
//! decrypted payloads get written back through the [`Storage`] trait.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use relay::{Connection, Mode, SqliteStorage, Storage};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Arc::new(SqliteStorage::new("account.session"));
//! storage.open().await?;
//!
//! let dc_id = storage.dc_id().await?;
//! let mut connection = Connection::new(storage.clone(), dc_id, false, false, false)
//!     .with_mode(Mode::Intermediate);
//! connection.connect().await?;
//!
//! connection.send(b"...framed, encrypted payload...").await?;
//! while let Some(frame) = connection.recv().await {
//!     // decrypt, dispatch, persist observed peers…
//! #   let _ = frame;
//! }
//! // `None`: the transport died; drop this connection and build a new one.
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Re-export of [`relay_transport`]: framing variants, proxying, connection
/// retry.
pub use relay_transport as transport;

/// Re-export of [`relay_storage`]: the `Storage` trait and its backends.
pub use relay_storage as storage;

pub mod listen;

// ─── Convenience re-exports ───────────────────────────────────────────────────

pub use listen::{Identifier, Match};

pub use relay_storage::{
    InputPeer, PeerType, PeerUpdate, SessionData, Storage, StorageError, UpdateState,
};

#[cfg(feature = "mongo")]
pub use relay_storage::MongoStorage;
pub use relay_storage::SqliteStorage;

pub use relay_transport::{Connection, ConnectionError, Mode, Proxy, Transport};
