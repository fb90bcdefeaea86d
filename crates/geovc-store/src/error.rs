use geovc_types::ObjectId;

/// Errors from object encoding and object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// The bytes do not form a valid canonical encoding.
    #[error("corrupt encoding: {0}")]
    CorruptEncoding(String),

    /// The encoding uses a format version or layout this build cannot read.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Stored bytes hash to a different id than the one they were stored under.
    #[error("hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch {
        expected: ObjectId,
        computed: ObjectId,
    },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Attempted to write a null object ID.
    #[error("cannot store object with null ID")]
    NullObjectId,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
