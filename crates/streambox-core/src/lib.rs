pub mod config;
pub mod error;

pub use config::{LogFormat, StreamboxConfig};
pub use error::{StreamboxError, StreamboxResult};
