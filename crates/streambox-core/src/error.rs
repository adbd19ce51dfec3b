use thiserror::Error;

pub type StreamboxResult<T> = Result<T, StreamboxError>;

#[derive(Debug, Error)]
pub enum StreamboxError {
    #[error("config error: {0}")]
    Config(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
