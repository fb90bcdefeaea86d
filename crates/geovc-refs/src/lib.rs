//! Reference management for geovc.
//!
//! References are the named entry points into history: branches under
//! `refs/heads/`, tags under `refs/tags/`, remote-tracking refs under
//! `refs/remotes/`, and `HEAD`, usually a symbolic ref naming a branch.
//!
//! All mutation goes through compare-and-swap. A [`RefTransaction`] stages
//! updates in its own namespace and publishes them with CAS at commit, so two
//! transactions touching the same ref cannot both succeed.
//!
//! # Modules
//!
//! - [`error`]: error types for ref operations
//! - [`types`]: [`Ref`] and [`RefValue`]
//! - [`traits`]: the [`RefDatabase`] backend contract
//! - [`names`]: ref name validation and well-known prefixes
//! - [`memory`]: in-memory [`InMemoryRefDatabase`]
//! - [`transaction`]: [`RefTransaction`]

pub mod error;
pub mod memory;
pub mod names;
pub mod traits;
pub mod transaction;
pub mod types;

pub use error::{RefError, RefResult};
pub use memory::InMemoryRefDatabase;
pub use names::{validate_ref_name, HEAD, HEADS_PREFIX, REMOTES_PREFIX, TAGS_PREFIX, TRANSACTIONS_PREFIX};
pub use traits::{RefDatabase, MAX_SYMBOLIC_DEPTH};
pub use transaction::{ChangedRef, RefTransaction};
pub use types::{Ref, RefValue};
