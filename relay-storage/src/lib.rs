//! # relay-storage
//!
//! Durable persistence for one MTProto session:
//!
//! - the scalar login state (`dc_id`, `api_id`, auth key, user id, …),
//! - a peer cache mapping ids, usernames and phone numbers to wire-ready
//!   references with access hashes,
//! - a secondary cache for non-primary ("fragment") usernames with an 8-hour
//!   freshness window,
//! - per-entity update-stream positions (`pts`/`qts`/`seq`) for gap
//!   detection,
//! - data-center addresses learned from server configs and redirects,
//! - a portable session-string codec.
//!
//! Everything goes through the [`Storage`] trait; pick a backend by
//! constructing it:
//!
//! ```rust,no_run
//! use relay_storage::{SqliteStorage, Storage};
//!
//! # async fn run() -> Result<(), relay_storage::StorageError> {
//! let storage = SqliteStorage::new("my_account.session");
//! storage.open().await?;
//! let string = storage.export_session_string().await?;
//! storage.save().await?;
//! # Ok(())
//! # }
//! ```
//!
//! The MongoDB backend lives behind the `mongo` cargo feature.

#![deny(unsafe_code)]

mod error;
mod peer;
mod session_string;
mod storage;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "mongo")]
mod mongo;

pub use error::StorageError;
pub use peer::{InputPeer, PeerType, PeerUpdate, input_peer};
pub use session_string::SessionData;
pub use storage::{DcAddress, Storage, USERNAMES_TTL, UpdateState, normalize_media};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

#[cfg(feature = "mongo")]
pub use mongo::MongoStorage;
