//! Record codec
//!
//! Wire format of one record:
//! ```text
//! [4 bytes: length, big-endian][24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! length = 24 + N + 16   (covers nonce and sealed payload, not itself)
//! ```
//!
//! Each record is sealed with XChaCha20-Poly1305 under the stream key and
//! its own nonce, without associated data, so every record authenticates on
//! its own.

use bytes::{BufMut, BytesMut};
use chacha20poly1305::{aead::Aead, XChaCha20Poly1305, XNonce};

use crate::error::{StreamError, StreamResult};
use crate::{NONCE_SIZE, TAG_SIZE};

/// Size of the big-endian length field in front of every record.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Bytes a record adds on top of its plaintext chunk.
pub const RECORD_OVERHEAD: usize = LENGTH_PREFIX_SIZE + NONCE_SIZE + TAG_SIZE;

/// Append `BE32(len(nonce) + len(sealed)) || nonce || sealed` to `out`.
///
/// The caller guarantees the body fits a `u32`; [`crate::StreamConfig`]
/// bounds chunk sizes accordingly.
pub fn encode(nonce: &[u8; NONCE_SIZE], sealed: &[u8], out: &mut BytesMut) {
    let body_len = NONCE_SIZE + sealed.len();
    out.reserve(LENGTH_PREFIX_SIZE + body_len);
    out.put_u32(body_len as u32);
    out.put_slice(nonce);
    out.put_slice(sealed);
}

/// Split a record body (everything after the length prefix) into nonce and
/// sealed payload. Returns `None` if the body is shorter than a nonce.
pub fn decode(body: &[u8]) -> Option<(&[u8; NONCE_SIZE], &[u8])> {
    body.split_first_chunk::<NONCE_SIZE>()
}

/// Validate a declared record length against the codec minimum and the
/// configured maximum.
pub fn check_length(declared: u32, max_record_size: usize, record: u64) -> StreamResult<usize> {
    let len = declared as usize;
    if len < NONCE_SIZE {
        return Err(StreamError::MalformedRecord {
            record,
            len,
            reason: "is shorter than a nonce",
        });
    }
    if len > max_record_size {
        return Err(StreamError::MalformedRecord {
            record,
            len,
            reason: "exceeds the record size limit",
        });
    }
    Ok(len)
}

/// Seal one plaintext chunk and append the framed record to `out`.
///
/// Nothing is appended if sealing fails.
pub(crate) fn seal_into(
    cipher: &XChaCha20Poly1305,
    nonce: &[u8; NONCE_SIZE],
    chunk: &[u8],
    record: u64,
    out: &mut BytesMut,
) -> StreamResult<usize> {
    // Only fails past the cipher's message limit, which StreamConfig rules out.
    let sealed = cipher
        .encrypt(XNonce::from_slice(nonce), chunk)
        .map_err(|_| StreamError::EncryptionFailed { record })?;
    encode(nonce, &sealed, out);
    Ok(LENGTH_PREFIX_SIZE + NONCE_SIZE + sealed.len())
}

/// Authenticate and decrypt one record body.
///
/// Returns the plaintext only if the tag verifies; a body too short to hold
/// a tag fails authentication like any other forgery.
pub(crate) fn open(
    cipher: &XChaCha20Poly1305,
    body: &[u8],
    record: u64,
) -> StreamResult<Vec<u8>> {
    let (nonce, sealed) = decode(body).ok_or(StreamError::MalformedRecord {
        record,
        len: body.len(),
        reason: "is shorter than a nonce",
    })?;
    if sealed.len() < TAG_SIZE {
        return Err(StreamError::DecryptionFailed { record });
    }
    cipher
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map_err(|_| StreamError::DecryptionFailed { record })
}
