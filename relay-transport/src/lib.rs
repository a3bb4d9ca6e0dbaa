//! # relay-transport
//!
//! The wire side of an MTProto client: byte-exact framing over TCP, proxy
//! tunnelling, DC address resolution and a bounded-retry connection wrapper.
//!
//! Four framing variants are provided, selected by [`Mode`]:
//!
//! | Variant | Connect tag | Frame |
//! |---------|-------------|-------|
//! | [`Abridged`] | `0xef` | `len/4` in 1 or 4 bytes, then payload |
//! | [`Intermediate`] | `0xee×4` | 4-byte LE length, then payload |
//! | [`Obfuscated`] | 64-byte random header | Intermediate, AES-256-CTR both ways |
//! | [`Full`] | none | LE length ‖ seq ‖ payload ‖ CRC-32 |
//!
//! A [`Connection`] owns one [`Transport`], resolves its DC address through
//! [`DataCenter`] (cache first, bootstrap table second) and gives up after
//! three failed attempts; reconnection policy belongs to the caller.
//!
//! Payloads are opaque bytes here: encryption, message ids and everything
//! else above the framing layer happens elsewhere.

#![deny(unsafe_code)]

pub mod abridged;
mod connection;
mod dc;
mod errors;
pub mod full;
pub mod intermediate;
pub mod obfuscated;
mod proxy;
mod tcp;
mod transport;

pub use abridged::Abridged;
pub use connection::Connection;
pub use dc::DataCenter;
pub use errors::ConnectionError;
pub use full::Full;
pub use intermediate::Intermediate;
pub use obfuscated::Obfuscated;
pub use proxy::Proxy;
pub use tcp::Tcp;
pub use transport::{Mode, Transport};
