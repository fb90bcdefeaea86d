//! Revision objects and content-addressed storage for geovc.
//!
//! Every piece of versioned data (commits, trees, features, feature types,
//! tags) is an immutable [`RevObject`] identified by the domain-separated
//! BLAKE3 hash of its canonical encoding (see [`codec`]).
//!
//! # Object Types
//!
//! - [`Commit`]: a snapshot of a root tree plus history metadata
//! - [`RevTree`]: a clustered tree, either a sorted leaf of [`Node`]s or a
//!   set of [`Bucket`]s pointing at child trees
//! - [`Feature`]: an ordered list of property [`Value`]s
//! - [`FeatureType`]: the schema shared by a set of features
//! - [`Tag`]: an annotated, named pointer to a commit
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`]: `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. `put` is idempotent and never overwrites an existing id.
//! 3. Concurrent reads are always safe.
//! 4. The store never interprets object contents; it is a pure key-value store.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod codec;
pub mod error;
pub mod memory;
pub mod object;
pub mod traits;
pub mod tree;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use object::{
    Commit, Feature, FeatureType, Person, PropertyDescriptor, PropertyType, RevObject, Tag, Value,
};
pub use traits::{BulkMode, ObjectStore};
pub use tree::{Bucket, Extent, Node, NodeKind, RevTree, TreeLayout};
