//! Failure classification for the stream transforms
//!
//! Every variant is fatal to the transform that raised it. The readers
//! implement `std::io::Read`, so a `StreamError` leaves `read` wrapped in an
//! `io::Error` whose kind reflects the failure; [`StreamError::classify`]
//! recovers the classification on the caller's side.

use std::io;

use thiserror::Error;

pub type StreamResult<T> = Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    /// The upstream source failed for a reason unrelated to framing.
    #[error("upstream I/O error: {0}")]
    Io(#[from] io::Error),

    /// The ciphertext ended inside a length prefix or a record body.
    #[error("stream truncated in record {record}: expected {expected} bytes, got {actual}")]
    TruncatedStream {
        record: u64,
        expected: usize,
        actual: usize,
    },

    #[error("malformed record {record}: declared length {len} {reason}")]
    MalformedRecord {
        record: u64,
        len: usize,
        reason: &'static str,
    },

    /// Authentication failed: wrong key or tampered record.
    #[error("could not decrypt record {record}: invalid key or corrupted data")]
    DecryptionFailed { record: u64 },

    /// The cipher refused to seal a chunk.
    #[error("could not encrypt record {record}")]
    EncryptionFailed { record: u64 },

    #[error("nonce generation failed: {0}")]
    NonceGenerationFailed(rand::Error),

    /// A read issued after the transform already failed.
    #[error("stream already failed ({0})")]
    Failed(FailureKind),
}

/// `Copy` summary of a [`StreamError`], kept by a failed transform so that
/// later reads report the same failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Io,
    TruncatedStream,
    MalformedRecord,
    DecryptionFailed,
    EncryptionFailed,
    NonceGenerationFailed,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Io => "upstream I/O error",
            FailureKind::TruncatedStream => "truncated stream",
            FailureKind::MalformedRecord => "malformed record",
            FailureKind::DecryptionFailed => "decryption failed",
            FailureKind::EncryptionFailed => "encryption failed",
            FailureKind::NonceGenerationFailed => "nonce generation failed",
        };
        f.write_str(s)
    }
}

impl FailureKind {
    fn io_kind(self) -> io::ErrorKind {
        match self {
            FailureKind::Io => io::ErrorKind::Other,
            FailureKind::TruncatedStream => io::ErrorKind::UnexpectedEof,
            FailureKind::MalformedRecord | FailureKind::DecryptionFailed => {
                io::ErrorKind::InvalidData
            }
            FailureKind::EncryptionFailed | FailureKind::NonceGenerationFailed => {
                io::ErrorKind::Other
            }
        }
    }
}

impl StreamError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StreamError::Io(_) => FailureKind::Io,
            StreamError::TruncatedStream { .. } => FailureKind::TruncatedStream,
            StreamError::MalformedRecord { .. } => FailureKind::MalformedRecord,
            StreamError::DecryptionFailed { .. } => FailureKind::DecryptionFailed,
            StreamError::EncryptionFailed { .. } => FailureKind::EncryptionFailed,
            StreamError::NonceGenerationFailed(_) => FailureKind::NonceGenerationFailed,
            StreamError::Failed(kind) => *kind,
        }
    }

    /// Classify an `io::Error` returned by one of the readers.
    ///
    /// Returns `None` for errors that did not originate in a transform.
    /// Upstream errors are handed back unchanged, so they classify as `None`
    /// the first time and as `Some(FailureKind::Io)` on any later read.
    pub fn classify(err: &io::Error) -> Option<FailureKind> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<StreamError>())
            .map(StreamError::kind)
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        match err {
            // Upstream failures are propagated verbatim.
            StreamError::Io(e) => e,
            other => io::Error::new(other.kind().io_kind(), other),
        }
    }
}
