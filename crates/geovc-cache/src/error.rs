use thiserror::Error;

/// Errors from cache configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("invalid size {value:?}: {reason}")]
    InvalidSize { value: String, reason: String },

    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
