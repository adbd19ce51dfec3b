//! Decrypting transform: record stream `Read` in, plaintext `Read` out

use std::io::{self, Read};

use bytes::BytesMut;
use chacha20poly1305::{aead::KeyInit, XChaCha20Poly1305};
use tracing::{debug, trace};

use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::keys::StreamKey;
use crate::pull::{read_full, PullBuffer, Refill, StreamState, StreamStats};
use crate::record::{self, LENGTH_PREFIX_SIZE};

/// Wrap a record-stream reader with the default configuration.
pub fn decrypt<R: Read>(key: &StreamKey, upstream: R) -> DecryptingReader<R> {
    DecryptingReader::new(key, upstream)
}

/// Reads length-prefixed records from `R`, authenticates and decrypts each,
/// and yields the recovered plaintext.
///
/// End of upstream exactly at a record boundary is the clean end of the
/// stream. Anything else (a partial prefix, a short body, a malformed length,
/// a record that fails authentication) is fatal: the reader moves to
/// [`StreamState::Failed`] and never releases plaintext from the offending
/// record or any record after it.
pub struct DecryptingReader<R> {
    opener: RecordOpener<R>,
    buffer: PullBuffer,
    config: StreamConfig,
}

struct RecordOpener<R> {
    upstream: R,
    cipher: XChaCha20Poly1305,
    body: Vec<u8>,
    max_record_size: usize,
    records: u64,
    ciphertext_bytes: u64,
}

impl<R: Read> DecryptingReader<R> {
    pub fn new(key: &StreamKey, upstream: R) -> Self {
        Self::with_config(key, upstream, StreamConfig::default())
    }

    pub fn with_config(key: &StreamKey, upstream: R, config: StreamConfig) -> Self {
        debug!(
            key = %key.fingerprint(),
            max_record_size = config.max_record_size(),
            "decrypting stream"
        );
        Self {
            opener: RecordOpener {
                upstream,
                cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
                body: Vec::new(),
                max_record_size: config.max_record_size(),
                records: 0,
                ciphertext_bytes: 0,
            },
            buffer: PullBuffer::with_capacity(config.message_size()),
            config,
        }
    }
}

impl<R> DecryptingReader<R> {
    pub fn get_ref(&self) -> &R {
        &self.opener.upstream
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.opener.upstream
    }

    /// Unwrap the upstream reader. Buffered plaintext not yet read is lost.
    pub fn into_inner(self) -> R {
        self.opener.upstream
    }

    pub fn state(&self) -> StreamState {
        self.buffer.state()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            records: self.opener.records,
            bytes_in: self.opener.ciphertext_bytes,
            bytes_out: self.buffer.delivered(),
        }
    }
}

impl<R: Read> Refill for RecordOpener<R> {
    fn refill(&mut self, pending: &mut BytesMut) -> StreamResult<bool> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        match read_full(&mut self.upstream, &mut prefix)? {
            0 => return Ok(false),
            LENGTH_PREFIX_SIZE => {}
            actual => {
                return Err(StreamError::TruncatedStream {
                    record: self.records,
                    expected: LENGTH_PREFIX_SIZE,
                    actual,
                })
            }
        }

        let len = record::check_length(
            u32::from_be_bytes(prefix),
            self.max_record_size,
            self.records,
        )?;
        self.body.resize(len, 0);
        let actual = read_full(&mut self.upstream, &mut self.body)?;
        if actual < len {
            return Err(StreamError::TruncatedStream {
                record: self.records,
                expected: len,
                actual,
            });
        }

        let plaintext = record::open(&self.cipher, &self.body, self.records)?;
        trace!(record = self.records, len, plaintext = plaintext.len(), "opened record");
        pending.extend_from_slice(&plaintext);
        self.records += 1;
        self.ciphertext_bytes += (LENGTH_PREFIX_SIZE + len) as u64;
        Ok(true)
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.buffer.read(&mut self.opener, buf)?)
    }
}

impl<R> std::fmt::Debug for DecryptingReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptingReader")
            .field("state", &self.state())
            .field("stats", &self.stats())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
