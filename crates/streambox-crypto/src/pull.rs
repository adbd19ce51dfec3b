//! Pull loop shared by both transforms
//!
//! A transform owns a [`PullBuffer`] and a direction-specific [`Refill`]
//! (seal-and-frame or parse-and-open). On each `read` the buffer tops itself
//! up one upstream unit at a time until it can satisfy the request or
//! upstream is exhausted, then serves bytes from its head.
//!
//! ```text
//! Active ──upstream exhausted──▶ Draining ──buffer empty──▶ Ended
//!   │                               │
//!   └──────────fatal error──────────┴──────────▶ Failed
//! ```

use std::io::{self, Read};

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::error::{FailureKind, StreamError, StreamResult};

/// Lifecycle of a transform. `Ended` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Pulling from upstream and serving reads.
    Active,
    /// Upstream exhausted; buffered bytes remain to be delivered.
    Draining,
    /// Everything delivered. Further reads return `Ok(0)`.
    Ended,
    /// A fatal error occurred. Further reads fail with the same kind.
    Failed(FailureKind),
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Ended | StreamState::Failed(_))
    }
}

/// Counters reported by [`crate::EncryptingReader::stats`] and
/// [`crate::DecryptingReader::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Records sealed or opened so far.
    pub records: u64,
    /// Bytes consumed from upstream.
    pub bytes_in: u64,
    /// Bytes delivered to the caller.
    pub bytes_out: u64,
}

/// One direction's per-unit transform.
pub(crate) trait Refill {
    /// Pull one unit from upstream and append its fully processed bytes to
    /// `pending`. Returns `Ok(false)` once upstream is exhausted; a unit that
    /// arrives together with exhaustion is appended before returning.
    fn refill(&mut self, pending: &mut BytesMut) -> StreamResult<bool>;
}

#[derive(Debug)]
pub(crate) struct PullBuffer {
    pending: BytesMut,
    state: StreamState,
    delivered: u64,
}

impl PullBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(capacity),
            state: StreamState::Active,
            delivered: 0,
        }
    }

    pub(crate) fn state(&self) -> StreamState {
        self.state
    }

    pub(crate) fn delivered(&self) -> u64 {
        self.delivered
    }

    pub(crate) fn read<F: Refill>(&mut self, source: &mut F, out: &mut [u8]) -> StreamResult<usize> {
        if let StreamState::Failed(kind) = self.state {
            return Err(StreamError::Failed(kind));
        }
        if out.is_empty() || self.state.is_terminal() {
            return Ok(0);
        }

        while self.state == StreamState::Active && self.pending.len() < out.len() {
            match source.refill(&mut self.pending) {
                Ok(true) => {}
                Ok(false) => self.state = StreamState::Draining,
                Err(e) => {
                    warn!(kind = %e.kind(), error = %e, "stream failed");
                    self.state = StreamState::Failed(e.kind());
                    self.pending.clear();
                    return Err(e);
                }
            }
        }

        let n = out.len().min(self.pending.len());
        out[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        self.delivered += n as u64;

        if self.state == StreamState::Draining && self.pending.is_empty() {
            debug!(delivered = self.delivered, "stream ended");
            self.state = StreamState::Ended;
        }
        Ok(n)
    }
}

/// Read until `buf` is full or upstream reports end of stream.
///
/// `Interrupted` reads are retried; they are stalled progress, not failure.
/// Returns the number of bytes read, which is short only at end of stream.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
