//! Keyless record walker
//!
//! Validates the framing of a ciphertext stream without opening any record:
//! useful for inspecting a stream whose key is not at hand. Truncation and
//! malformed lengths are classified exactly as [`crate::DecryptingReader`]
//! classifies them.

use std::io::{self, Read};

use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::pull::read_full;
use crate::record::{self, LENGTH_PREFIX_SIZE};
use crate::{NONCE_SIZE, TAG_SIZE};

/// Position and size of one record in a ciphertext stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Zero-based record index.
    pub index: u64,
    /// Stream offset of the record's length prefix.
    pub offset: u64,
    /// Declared length (nonce + sealed payload).
    pub len: usize,
}

impl RecordHeader {
    /// Plaintext bytes the record carries if it authenticates.
    pub fn plaintext_len(&self) -> usize {
        self.len.saturating_sub(NONCE_SIZE + TAG_SIZE)
    }

    /// Total bytes on the wire, prefix included.
    pub fn wire_len(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.len
    }
}

/// Iterator over the record headers of a ciphertext stream.
///
/// Yields `Err` at most once; iteration stops after the first error.
pub struct RecordScanner<R> {
    upstream: R,
    max_record_size: usize,
    index: u64,
    offset: u64,
    done: bool,
}

impl<R: Read> RecordScanner<R> {
    pub fn new(upstream: R) -> Self {
        Self::with_config(upstream, StreamConfig::default())
    }

    pub fn with_config(upstream: R, config: StreamConfig) -> Self {
        Self {
            upstream,
            max_record_size: config.max_record_size(),
            index: 0,
            offset: 0,
            done: false,
        }
    }

    fn next_header(&mut self) -> StreamResult<Option<RecordHeader>> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        match read_full(&mut self.upstream, &mut prefix)? {
            0 => return Ok(None),
            LENGTH_PREFIX_SIZE => {}
            actual => {
                return Err(StreamError::TruncatedStream {
                    record: self.index,
                    expected: LENGTH_PREFIX_SIZE,
                    actual,
                })
            }
        }

        let len = record::check_length(u32::from_be_bytes(prefix), self.max_record_size, self.index)?;
        let skipped = io::copy(&mut (&mut self.upstream).take(len as u64), &mut io::sink())?;
        if skipped < len as u64 {
            return Err(StreamError::TruncatedStream {
                record: self.index,
                expected: len,
                actual: skipped as usize,
            });
        }

        let header = RecordHeader {
            index: self.index,
            offset: self.offset,
            len,
        };
        self.index += 1;
        self.offset += header.wire_len() as u64;
        Ok(Some(header))
    }
}

impl<R: Read> Iterator for RecordScanner<R> {
    type Item = StreamResult<RecordHeader>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_header() {
            Ok(Some(header)) => Some(Ok(header)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::keys::StreamKey;
    use crate::record::RECORD_OVERHEAD;
    use crate::EncryptingReader;

    fn sealed(len: usize, message_size: usize) -> Vec<u8> {
        let config = StreamConfig::with_message_size(message_size).unwrap();
        let key = StreamKey::from_bytes([1u8; 32]);
        let mut out = Vec::new();
        EncryptingReader::with_config(&key, &vec![0u8; len][..], config)
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_headers_cover_stream() {
        let ciphertext = sealed(250, 100);
        let headers: Vec<_> = RecordScanner::new(&ciphertext[..])
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(headers.len(), 3);
        assert_eq!(
            headers.iter().map(RecordHeader::plaintext_len).collect::<Vec<_>>(),
            vec![100, 100, 50]
        );
        assert_eq!(headers[0].offset, 0);
        assert_eq!(headers[1].offset, (100 + RECORD_OVERHEAD) as u64);
        let total: usize = headers.iter().map(RecordHeader::wire_len).sum();
        assert_eq!(total, ciphertext.len());
    }

    #[test]
    fn test_empty_stream_has_no_records() {
        assert_eq!(RecordScanner::new(&b""[..]).count(), 0);
    }

    #[test]
    fn test_truncation_is_reported_once() {
        let ciphertext = sealed(50, 100);
        let mut scanner = RecordScanner::new(&ciphertext[..ciphertext.len() - 3]);

        let err = scanner.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), FailureKind::TruncatedStream);
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_malformed_length_is_reported() {
        let mut ciphertext = sealed(10, 100);
        ciphertext.extend_from_slice(&5u32.to_be_bytes());

        let results: Vec<_> = RecordScanner::new(&ciphertext[..]).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(StreamError::MalformedRecord { record: 1, len: 5, .. })
        ));
    }
}
