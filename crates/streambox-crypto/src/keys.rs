//! Pre-shared stream key: generation, parsing, and fingerprinting

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

use crate::KEY_SIZE;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key must be exactly 32 bytes, got {0}")]
    WrongLength(usize),

    #[error("key is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
}

/// A 256-bit pre-shared key. Zeroized on drop.
///
/// Both ends of a stream must hold the same key; nothing in this crate
/// derives, exchanges or rotates it.
#[derive(Clone)]
pub struct StreamKey {
    bytes: [u8; KEY_SIZE],
}

impl StreamKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| KeyError::WrongLength(bytes.len()))?;
        Ok(Self { bytes })
    }

    /// Parse a standard base64 key. Surrounding whitespace is ignored so
    /// key files with a trailing newline load as-is.
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let mut decoded = STANDARD.decode(encoded.trim())?;
        let key = Self::from_slice(&decoded);
        decoded.zeroize();
        key
    }

    /// Parse key file contents: either 32 raw bytes or base64 text.
    pub fn from_file_contents(contents: &[u8]) -> Result<Self, KeyError> {
        if contents.len() == KEY_SIZE {
            return Self::from_slice(contents);
        }
        match std::str::from_utf8(contents) {
            Ok(text) => Self::from_base64(text),
            Err(_) => Err(KeyError::WrongLength(contents.len())),
        }
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Short identifier safe to log: hex of the first 8 bytes of BLAKE3(key).
    pub fn fingerprint(&self) -> String {
        blake3::hash(&self.bytes).to_hex()[..16].to_string()
    }
}

impl Drop for StreamKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamKey")
            .field("fingerprint", &self.fingerprint())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit stream key.
pub fn generate_key() -> StreamKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    StreamKey::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let k1 = generate_key();
        let k2 = generate_key();
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_base64_roundtrip_with_whitespace() {
        let key = StreamKey::from_bytes([7u8; KEY_SIZE]);
        let encoded = format!("  {}\n", key.to_base64());

        let parsed = StreamKey::from_base64(&encoded).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_wrong_length_rejected() {
        let short = STANDARD.encode([1u8; 31]);
        match StreamKey::from_base64(&short) {
            Err(KeyError::WrongLength(31)) => {}
            other => panic!("expected WrongLength(31), got {other:?}"),
        }
        assert!(StreamKey::from_slice(&[0u8; 33]).is_err());
    }

    #[test]
    fn test_invalid_base64_rejected() {
        assert!(matches!(
            StreamKey::from_base64("not*base64!"),
            Err(KeyError::Encoding(_))
        ));
    }

    #[test]
    fn test_file_contents_raw_or_text() {
        let raw = [0x5Au8; KEY_SIZE];
        let from_raw = StreamKey::from_file_contents(&raw).unwrap();
        assert_eq!(from_raw.as_bytes(), &raw);

        let text = format!("{}\n", from_raw.to_base64());
        let from_text = StreamKey::from_file_contents(text.as_bytes()).unwrap();
        assert_eq!(from_text.as_bytes(), &raw);

        assert!(StreamKey::from_file_contents(&[0xFFu8; 10]).is_err());
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let key = StreamKey::from_bytes([42u8; KEY_SIZE]);
        assert_eq!(key.fingerprint(), key.clone().fingerprint());
        assert_eq!(key.fingerprint().len(), 16);

        let other = StreamKey::from_bytes([43u8; KEY_SIZE]);
        assert_ne!(key.fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_debug_redacts_key_bytes() {
        let key = StreamKey::from_bytes([0xABu8; KEY_SIZE]);
        let debug = format!("{key:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("171, 171"), "raw key bytes must not be printed");
    }
}
