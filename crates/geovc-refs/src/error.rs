//! Error types for reference operations.

use thiserror::Error;

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The reference was not found.
    #[error("ref not found: {name}")]
    NotFound { name: String },

    /// The ref name breaks the naming rules.
    #[error("invalid ref name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Symbolic refs chain deeper than allowed, usually a cycle.
    #[error("too many symbolic ref hops resolving {name}")]
    SymbolicLoop { name: String },

    /// A ref changed in the parent database after the transaction first
    /// touched it.
    #[error("transaction conflict on {name}")]
    TransactionConflict { name: String },

    /// The transaction was already committed or aborted.
    #[error("transaction is closed")]
    TransactionClosed,

    /// The backend failed.
    #[error("ref backend error: {0}")]
    Backend(String),
}

/// Convenience type alias for ref operations.
pub type RefResult<T> = std::result::Result<T, RefError>;
