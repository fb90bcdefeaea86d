use geovc_store::StoreError;
use thiserror::Error;

/// Errors from building or reading revision trees.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stored tree uses a layout this configuration cannot extend.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid tree configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid node name {name:?}: {reason}")]
    InvalidNodeName { name: String, reason: String },
}

/// Result alias for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
