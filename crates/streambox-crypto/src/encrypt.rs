//! Encrypting transform: plaintext `Read` in, record stream `Read` out

use std::io::{self, Read};

use bytes::BytesMut;
use chacha20poly1305::{aead::KeyInit, XChaCha20Poly1305};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use tracing::{debug, trace};

use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::keys::StreamKey;
use crate::pull::{read_full, PullBuffer, Refill, StreamState, StreamStats};
use crate::record::{self, RECORD_OVERHEAD};
use crate::NONCE_SIZE;

/// Wrap a plaintext reader with the default configuration and OS nonces.
pub fn encrypt<R: Read>(key: &StreamKey, upstream: R) -> EncryptingReader<R> {
    EncryptingReader::new(key, upstream)
}

/// Reads plaintext from `R` in chunks of `message_size` bytes and yields the
/// corresponding length-prefixed XChaCha20-Poly1305 records.
///
/// Every chunk is sealed under a fresh 24-byte nonce drawn from `N`. A chunk
/// is filled until it is full or upstream reports end of stream, so record
/// boundaries do not depend on how upstream fragments its reads. Empty input
/// yields an empty stream.
///
/// A single instance must be driven by one consumer; `read` takes `&mut self`.
pub struct EncryptingReader<R, N = OsRng> {
    sealer: ChunkSealer<R, N>,
    buffer: PullBuffer,
    config: StreamConfig,
}

struct ChunkSealer<R, N> {
    upstream: R,
    cipher: XChaCha20Poly1305,
    nonces: N,
    chunk: Vec<u8>,
    records: u64,
    plaintext_bytes: u64,
}

impl<R: Read> EncryptingReader<R> {
    pub fn new(key: &StreamKey, upstream: R) -> Self {
        Self::with_config(key, upstream, StreamConfig::default())
    }

    pub fn with_config(key: &StreamKey, upstream: R, config: StreamConfig) -> Self {
        Self::with_nonce_source(key, upstream, config, OsRng)
    }
}

impl<R: Read, N: RngCore + CryptoRng> EncryptingReader<R, N> {
    /// Build a reader that draws nonces from `nonces` instead of the OS.
    pub fn with_nonce_source(key: &StreamKey, upstream: R, config: StreamConfig, nonces: N) -> Self {
        debug!(
            key = %key.fingerprint(),
            message_size = config.message_size(),
            "encrypting stream"
        );
        Self {
            sealer: ChunkSealer {
                upstream,
                cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
                nonces,
                chunk: vec![0u8; config.message_size()],
                records: 0,
                plaintext_bytes: 0,
            },
            buffer: PullBuffer::with_capacity(config.message_size() + RECORD_OVERHEAD),
            config,
        }
    }
}

impl<R, N> EncryptingReader<R, N> {
    pub fn get_ref(&self) -> &R {
        &self.sealer.upstream
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.sealer.upstream
    }

    /// Unwrap the upstream reader. Buffered records not yet read are lost.
    pub fn into_inner(self) -> R {
        self.sealer.upstream
    }

    pub fn state(&self) -> StreamState {
        self.buffer.state()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            records: self.sealer.records,
            bytes_in: self.sealer.plaintext_bytes,
            bytes_out: self.buffer.delivered(),
        }
    }
}

impl<R: Read, N: RngCore + CryptoRng> Refill for ChunkSealer<R, N> {
    fn refill(&mut self, pending: &mut BytesMut) -> StreamResult<bool> {
        let n = read_full(&mut self.upstream, &mut self.chunk)?;
        if n == 0 {
            return Ok(false);
        }

        let mut nonce = [0u8; NONCE_SIZE];
        self.nonces
            .try_fill_bytes(&mut nonce)
            .map_err(StreamError::NonceGenerationFailed)?;

        let chunk = &self.chunk[..n];
        let written = record::seal_into(&self.cipher, &nonce, chunk, self.records, pending)?;
        trace!(record = self.records, plaintext = n, written, "sealed record");
        self.records += 1;
        self.plaintext_bytes += n as u64;

        // A short chunk means upstream hit end of stream while filling it.
        Ok(n == self.chunk.len())
    }
}

impl<R: Read, N: RngCore + CryptoRng> Read for EncryptingReader<R, N> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.buffer.read(&mut self.sealer, buf)?)
    }
}

impl<R, N> std::fmt::Debug for EncryptingReader<R, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptingReader")
            .field("state", &self.state())
            .field("stats", &self.stats())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::record::LENGTH_PREFIX_SIZE;
    use crate::TAG_SIZE;

    fn test_key() -> StreamKey {
        StreamKey::from_bytes([0x42u8; 32])
    }

    /// A nonce source whose entropy runs out after `budget` nonces.
    struct Exhausting {
        budget: usize,
    }

    impl RngCore for Exhausting {
        fn next_u32(&mut self) -> u32 {
            unimplemented!("only try_fill_bytes is used")
        }

        fn next_u64(&mut self) -> u64 {
            unimplemented!("only try_fill_bytes is used")
        }

        fn fill_bytes(&mut self, _dest: &mut [u8]) {
            unimplemented!("only try_fill_bytes is used")
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            if self.budget == 0 {
                return Err(rand::Error::new(io::Error::other("entropy exhausted")));
            }
            self.budget -= 1;
            dest.fill(self.budget as u8);
            Ok(())
        }
    }

    impl CryptoRng for Exhausting {}

    #[test]
    fn test_empty_input_yields_empty_stream() {
        let mut reader = encrypt(&test_key(), &b""[..]);
        let mut out = Vec::new();

        reader.read_to_end(&mut out).unwrap();

        assert!(out.is_empty());
        assert_eq!(reader.stats().records, 0);
        assert_eq!(reader.state(), StreamState::Ended);
    }

    #[test]
    fn test_single_record_size() {
        let mut reader = encrypt(&test_key(), &[7u8; 16][..]);
        let mut out = Vec::new();

        reader.read_to_end(&mut out).unwrap();

        assert_eq!(out.len(), LENGTH_PREFIX_SIZE + NONCE_SIZE + 16 + TAG_SIZE);
        assert_eq!(&out[..4], &((NONCE_SIZE + 16 + TAG_SIZE) as u32).to_be_bytes());
        assert_eq!(reader.stats().records, 1);
        assert_eq!(reader.stats().bytes_in, 16);
        assert_eq!(reader.stats().bytes_out, out.len() as u64);
    }

    #[test]
    fn test_small_message_size_splits_chunks() {
        let config = StreamConfig::with_message_size(10).unwrap();
        let mut reader = EncryptingReader::with_config(&test_key(), &[1u8; 25][..], config);
        let mut out = Vec::new();

        reader.read_to_end(&mut out).unwrap();

        assert_eq!(reader.stats().records, 3);
        assert_eq!(out.len(), 25 + 3 * RECORD_OVERHEAD);
    }

    #[test]
    fn test_nonce_failure_is_fatal_and_sticky() {
        let config = StreamConfig::with_message_size(4).unwrap();
        let mut reader = EncryptingReader::with_nonce_source(
            &test_key(),
            &[0u8; 12][..],
            config,
            Exhausting { budget: 1 },
        );

        // The first record fits in a small read; the second needs a nonce.
        let mut first = [0u8; 4 + RECORD_OVERHEAD];
        assert_eq!(reader.read(&mut first).unwrap(), first.len());

        let mut buf = [0u8; 64];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert_eq!(
            StreamError::classify(&err),
            Some(FailureKind::NonceGenerationFailed)
        );
        assert_eq!(
            reader.state(),
            StreamState::Failed(FailureKind::NonceGenerationFailed)
        );
        assert_eq!(reader.stats().records, 1, "no record for the failed chunk");

        let again = reader.read(&mut buf).unwrap_err();
        assert_eq!(
            StreamError::classify(&again),
            Some(FailureKind::NonceGenerationFailed)
        );
    }

    #[test]
    fn test_upstream_error_propagates_verbatim() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "no access"))
            }
        }

        let mut reader = encrypt(&test_key(), Broken);
        let err = reader.read(&mut [0u8; 8]).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(err.to_string(), "no access");
        assert_eq!(reader.state(), StreamState::Failed(FailureKind::Io));
    }

    #[test]
    fn test_accessors() {
        let mut reader = encrypt(&test_key(), std::io::Cursor::new(vec![1u8, 2, 3]));
        assert_eq!(reader.get_ref().position(), 0);
        reader.get_mut().set_position(1);
        assert_eq!(reader.config().message_size(), 16384);
        assert_eq!(reader.into_inner().position(), 1);
    }
}
