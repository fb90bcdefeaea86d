use geovc_refs::RefError;
use geovc_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid refspec {spec:?}: {reason}")]
    InvalidRefSpec { spec: String, reason: String },

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("ref rejected: {name}: {reason}")]
    RefRejected { name: String, reason: String },

    #[error("not a fast-forward update for ref {0}")]
    NotFastForward(String),

    #[error("corrupt bundle: {0}")]
    CorruptBundle(String),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ref error: {0}")]
    Refs(#[from] RefError),
}

pub type SyncResult<T> = Result<T, SyncError>;
