//! Error types for the diff crate.

use geovc_store::StoreError;

/// Errors that can occur during diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// Store operation failed, including objects missing from the store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The two trees use bucket layouts that cannot be compared.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
