use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot resolve {0:?}")]
    UnknownRevision(String),

    #[error("{id} is a {kind}, not a commit or tree")]
    NotTreeish { id: String, kind: String },

    #[error("branch {branch} moved while committing")]
    CommitConflict { branch: String },

    #[error("store error: {0}")]
    Store(#[from] geovc_store::StoreError),

    #[error("cache error: {0}")]
    Cache(#[from] geovc_cache::CacheError),

    #[error("tree error: {0}")]
    Tree(#[from] geovc_tree::TreeError),

    #[error("diff error: {0}")]
    Diff(#[from] geovc_diff::DiffError),

    #[error("ref error: {0}")]
    Ref(#[from] geovc_refs::RefError),

    #[error("sync error: {0}")]
    Sync(#[from] geovc_sync::SyncError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
