use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{StreamboxError, StreamboxResult};

/// Top-level configuration (loaded from streambox.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamboxConfig {
    pub stream: StreamSettings,
    pub keys: KeySettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Plaintext bytes per record when encrypting (default: 16384)
    pub message_size: usize,
    /// Largest declared record length accepted when decrypting (default: 16 MiB)
    pub max_record_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySettings {
    /// Key file: 32 raw bytes or base64 text
    pub key_file: Option<PathBuf>,
    /// Environment variable holding a base64 key (default: STREAMBOX_KEY)
    pub key_env: String,
    /// Warn if the key file is readable by group or others (default: true)
    pub key_file_mode_check: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            message_size: 16 * 1024,
            max_record_size: 16 * 1024 * 1024,
        }
    }
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            key_file: None,
            key_env: "STREAMBOX_KEY".into(),
            key_file_mode_check: true,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

impl StreamboxConfig {
    /// Parse a config file. The caller decides what a missing file means.
    pub fn from_file(path: &Path) -> StreamboxResult<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| StreamboxError::Config(format!("parsing {}: {e}", path.display())))
    }

    pub fn to_toml(&self) -> StreamboxResult<String> {
        toml::to_string_pretty(self).map_err(|e| StreamboxError::Config(e.to_string()))
    }

    /// Key file path with `~` expanded.
    pub fn key_file(&self) -> Option<PathBuf> {
        self.keys.key_file.as_deref().map(expand_tilde)
    }
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}
