//! Construction-time parameters shared by both transforms

use thiserror::Error;

use crate::{NONCE_SIZE, TAG_SIZE};

/// Default plaintext chunk size: 16 KiB per record.
pub const DEFAULT_MESSAGE_SIZE: usize = 16 * 1024;

/// Default upper bound on a declared record length (16 MiB).
pub const DEFAULT_MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

/// Largest chunk that still fits a record under the default limit.
pub const MAX_MESSAGE_SIZE: usize = DEFAULT_MAX_RECORD_SIZE - NONCE_SIZE - TAG_SIZE;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("message_size must be between 1 and {max}, got {got}")]
    MessageSize { got: usize, max: usize },

    #[error("max_record_size {got} cannot hold a record for message_size {message_size} (needs {needed})")]
    MaxRecordSize {
        got: usize,
        message_size: usize,
        needed: usize,
    },
}

/// Stream framing parameters.
///
/// `message_size` only affects encryption. `max_record_size` only affects
/// decryption: it bounds the allocation a forged length prefix can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    message_size: usize,
    max_record_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            message_size: DEFAULT_MESSAGE_SIZE,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
        }
    }
}

impl StreamConfig {
    pub fn new(message_size: usize, max_record_size: usize) -> Result<Self, ConfigError> {
        if message_size == 0 || message_size > MAX_MESSAGE_SIZE {
            return Err(ConfigError::MessageSize {
                got: message_size,
                max: MAX_MESSAGE_SIZE,
            });
        }
        let needed = record_body_len(message_size);
        if max_record_size < needed || max_record_size > u32::MAX as usize {
            return Err(ConfigError::MaxRecordSize {
                got: max_record_size,
                message_size,
                needed,
            });
        }
        Ok(Self {
            message_size,
            max_record_size,
        })
    }

    pub fn with_message_size(message_size: usize) -> Result<Self, ConfigError> {
        Self::new(message_size, DEFAULT_MAX_RECORD_SIZE)
    }

    pub fn message_size(&self) -> usize {
        self.message_size
    }

    pub fn max_record_size(&self) -> usize {
        self.max_record_size
    }
}

/// Length-field value of a record carrying `plaintext_len` bytes.
pub(crate) fn record_body_len(plaintext_len: usize) -> usize {
    NONCE_SIZE + plaintext_len + TAG_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.message_size(), 16384);
        assert_eq!(config.max_record_size(), 16 * 1024 * 1024);
    }

    #[test]
    fn test_zero_message_size_rejected() {
        assert_eq!(
            StreamConfig::with_message_size(0),
            Err(ConfigError::MessageSize {
                got: 0,
                max: MAX_MESSAGE_SIZE
            })
        );
    }

    #[test]
    fn test_largest_message_size_fits_default_limit() {
        let config = StreamConfig::with_message_size(MAX_MESSAGE_SIZE).unwrap();
        assert_eq!(
            record_body_len(config.message_size()),
            DEFAULT_MAX_RECORD_SIZE
        );
        assert!(StreamConfig::with_message_size(MAX_MESSAGE_SIZE + 1).is_err());
    }

    #[test]
    fn test_record_limit_must_hold_a_full_record() {
        let err = StreamConfig::new(1024, 1024).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MaxRecordSize {
                got: 1024,
                message_size: 1024,
                needed: 1024 + NONCE_SIZE + TAG_SIZE,
            }
        );
        assert!(StreamConfig::new(1024, 1024 + NONCE_SIZE + TAG_SIZE).is_ok());
    }
}
