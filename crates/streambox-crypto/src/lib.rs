//! streambox-crypto: chunked authenticated encryption for byte streams
//!
//! Architecture: Chunk-then-Seal with XChaCha20-Poly1305 under a pre-shared key
//!
//! Pipeline: plaintext `Read` → fixed-size chunk → seal (fresh random nonce) → length-prefixed record
//!
//! Wire format:
//! ```text
//! stream := record*
//! record := [4 bytes: BE length][24 bytes: nonce][N bytes: ciphertext][16 bytes: tag]
//! ```
//!
//! Both transforms are pull-based `std::io::Read` adapters. Neither ever
//! buffers more than one record beyond what the caller asked for, so streams
//! of unbounded length encrypt and decrypt in constant memory.
//!
//! ```
//! use std::io::Read;
//! use streambox_crypto::{decrypt, encrypt, generate_key};
//!
//! let key = generate_key();
//! let mut ciphertext = Vec::new();
//! encrypt(&key, &b"attack at dawn"[..]).read_to_end(&mut ciphertext)?;
//!
//! let mut plaintext = Vec::new();
//! decrypt(&key, &ciphertext[..]).read_to_end(&mut plaintext)?;
//! assert_eq!(plaintext, b"attack at dawn");
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod config;
pub mod decrypt;
pub mod encrypt;
pub mod error;
pub mod keys;
pub mod pull;
pub mod record;
pub mod scan;

pub use config::{ConfigError, StreamConfig, DEFAULT_MAX_RECORD_SIZE, DEFAULT_MESSAGE_SIZE};
pub use decrypt::{decrypt, DecryptingReader};
pub use encrypt::{encrypt, EncryptingReader};
pub use error::{FailureKind, StreamError, StreamResult};
pub use keys::{generate_key, KeyError, StreamKey};
pub use pull::{StreamState, StreamStats};
pub use record::{LENGTH_PREFIX_SIZE, RECORD_OVERHEAD};
pub use scan::{RecordHeader, RecordScanner};

/// Size of a stream key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
