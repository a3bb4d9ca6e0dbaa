//! Portable session-string codec.
//!
//! A session string packs the whole login state (DC, API id, auth key,
//! user id) into one copy-pasteable token so a session can move between
//! machines without re-running the key exchange.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::StorageError;

/// Current layout: `dc_id u8 | api_id u32 | test_mode u8 | auth_key [u8; 256]
/// | user_id u64 | is_bot u8`, big-endian, base64url without padding.
const PACKED_LEN: usize = 1 + 4 + 1 + 256 + 8 + 1;
/// Legacy layout without `api_id`, 64-bit user id. Decoded, never produced.
const LEGACY_LEN_64: usize = 1 + 1 + 256 + 8 + 1;
/// Legacy layout without `api_id`, 32-bit user id. Decoded, never produced.
const LEGACY_LEN_32: usize = 1 + 1 + 256 + 4 + 1;

/// The scalar session record, as carried by a session string.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionData {
    pub dc_id: u32,
    pub api_id: i32,
    pub test_mode: bool,
    pub auth_key: [u8; 256],
    pub user_id: i64,
    pub is_bot: bool,
}

impl std::fmt::Debug for SessionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The auth key is a long-lived secret; keep it out of logs.
        f.debug_struct("SessionData")
            .field("dc_id", &self.dc_id)
            .field("api_id", &self.api_id)
            .field("test_mode", &self.test_mode)
            .field("user_id", &self.user_id)
            .field("is_bot", &self.is_bot)
            .finish_non_exhaustive()
    }
}

impl SessionData {
    /// Pack into the current session-string layout.
    pub fn encode(&self) -> String {
        let mut buf = Vec::with_capacity(PACKED_LEN);
        buf.push(self.dc_id as u8);
        buf.extend_from_slice(&(self.api_id as u32).to_be_bytes());
        buf.push(self.test_mode as u8);
        buf.extend_from_slice(&self.auth_key);
        buf.extend_from_slice(&(self.user_id as u64).to_be_bytes());
        buf.push(self.is_bot as u8);
        URL_SAFE_NO_PAD.encode(buf)
    }

    /// Decode a session string in any supported layout.
    ///
    /// The two legacy api_id-less layouts are told apart from the current one
    /// by their decoded length. Legacy imports get `api_id = 0`.
    pub fn decode(string: &str) -> Result<Self, StorageError> {
        let raw = URL_SAFE_NO_PAD
            .decode(string.trim().trim_end_matches('='))
            .map_err(|e| StorageError::BadSession(format!("base64: {e}")))?;

        let mut pos = 0usize;
        macro_rules! take {
            ($n:expr) => {{
                let s = &raw[pos..pos + $n];
                pos += $n;
                s
            }};
        }

        let data = match raw.len() {
            PACKED_LEN => {
                let dc_id = take!(1)[0] as u32;
                let api_id = u32::from_be_bytes(take!(4).try_into().unwrap()) as i32;
                let test_mode = take!(1)[0] != 0;
                let mut auth_key = [0u8; 256];
                auth_key.copy_from_slice(take!(256));
                let user_id = u64::from_be_bytes(take!(8).try_into().unwrap()) as i64;
                let is_bot = take!(1)[0] != 0;
                Self { dc_id, api_id, test_mode, auth_key, user_id, is_bot }
            }
            LEGACY_LEN_64 | LEGACY_LEN_32 => {
                let dc_id = take!(1)[0] as u32;
                let test_mode = take!(1)[0] != 0;
                let mut auth_key = [0u8; 256];
                auth_key.copy_from_slice(take!(256));
                let user_id = if raw.len() == LEGACY_LEN_64 {
                    u64::from_be_bytes(take!(8).try_into().unwrap()) as i64
                } else {
                    u32::from_be_bytes(take!(4).try_into().unwrap()) as i64
                };
                let is_bot = take!(1)[0] != 0;
                Self { dc_id, api_id: 0, test_mode, auth_key, user_id, is_bot }
            }
            n => {
                return Err(StorageError::BadSession(format!(
                    "unexpected session payload length {n}"
                )));
            }
        };
        debug_assert_eq!(pos, raw.len());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionData {
        let mut auth_key = [0u8; 256];
        for (i, byte) in auth_key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        SessionData {
            dc_id: 4,
            api_id: 123_456,
            test_mode: false,
            auth_key,
            user_id: 5_096_231_338,
            is_bot: false,
        }
    }

    #[test]
    fn round_trips() {
        let session = sample();
        let decoded = SessionData::decode(&session.encode()).unwrap();
        assert_eq!(decoded, session);
    }

    #[test]
    fn encoded_form_has_no_padding() {
        assert!(!sample().encode().contains('='));
    }

    #[test]
    fn decodes_with_stray_padding() {
        let padded = format!("{}==", sample().encode());
        assert_eq!(SessionData::decode(&padded).unwrap(), sample());
    }

    #[test]
    fn decodes_legacy_64_bit_layout() {
        let session = sample();
        let mut raw = Vec::with_capacity(267);
        raw.push(session.dc_id as u8);
        raw.push(session.test_mode as u8);
        raw.extend_from_slice(&session.auth_key);
        raw.extend_from_slice(&(session.user_id as u64).to_be_bytes());
        raw.push(session.is_bot as u8);
        let decoded = SessionData::decode(&URL_SAFE_NO_PAD.encode(raw)).unwrap();
        assert_eq!(decoded.user_id, session.user_id);
        assert_eq!(decoded.auth_key, session.auth_key);
        assert_eq!(decoded.api_id, 0);
    }

    #[test]
    fn decodes_legacy_32_bit_layout() {
        let mut raw = Vec::with_capacity(263);
        raw.push(1u8);
        raw.push(1u8);
        raw.extend_from_slice(&[0xAB; 256]);
        raw.extend_from_slice(&777_000u32.to_be_bytes());
        raw.push(1u8);
        let decoded = SessionData::decode(&URL_SAFE_NO_PAD.encode(raw)).unwrap();
        assert_eq!(decoded.dc_id, 1);
        assert!(decoded.test_mode);
        assert_eq!(decoded.user_id, 777_000);
        assert!(decoded.is_bot);
    }

    #[test]
    fn rejects_garbage_lengths() {
        let raw = vec![0u8; 100];
        assert!(matches!(
            SessionData::decode(&URL_SAFE_NO_PAD.encode(raw)),
            Err(StorageError::BadSession(_))
        ));
        assert!(SessionData::decode("?!not-base64!?").is_err());
    }
}
