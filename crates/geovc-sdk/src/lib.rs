//! High-level SDK for geovc.
//!
//! [`Repository`] ties together an object store, a shared cache, a ref
//! database and the tree and diff engines behind one handle. This is the
//! main entry point for applications embedding geovc.

pub mod config;
pub mod error;
pub mod repository;

pub use config::RepositoryConfig;
pub use error::{SdkError, SdkResult};
pub use repository::{Repository, TreeEdit};

// Re-export key types
pub use geovc_cache::{CacheConfig, CacheScope, ObjectDatabase, SharedCache};
pub use geovc_diff::{DiffCounts, DiffEntry, DiffOptions, DiffStream};
pub use geovc_refs::{Ref, RefDatabase, RefTransaction, RefValue};
pub use geovc_store::{Commit, Extent, Feature, FeatureType, Node, Person, RevTree, Value};
pub use geovc_tree::{RevTreeBuilder, TreeConfig};
pub use geovc_types::{CancelToken, ObjectId, Outcome};
