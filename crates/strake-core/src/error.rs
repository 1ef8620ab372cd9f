use thiserror::Error;

pub type Result<T> = std::result::Result<T, StrakeError>;

#[derive(Debug, Error)]
pub enum StrakeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Framing(String),

    #[error("unexpected record: expected {expected}, got '{got}'")]
    UnexpectedRecord { expected: &'static str, got: char },

    #[error("truncated read: wanted {wanted} bytes, got {got}")]
    TruncatedRead { wanted: usize, got: usize },

    #[error("sparse index corrupt: {0}")]
    IndexCorrupt(String),

    #[error("storage path space exhausted")]
    AllocationExhausted,

    #[error("invalid attributes payload: {0}")]
    InvalidAttribs(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}
