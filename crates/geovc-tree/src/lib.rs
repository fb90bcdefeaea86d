//! Clustered revision trees for geovc.
//!
//! A [`RevTree`](geovc_store::RevTree) holding fewer than `split_threshold`
//! entries is a single sorted leaf. Larger trees are split into up to
//! `2^bucket_bits` buckets by the hash of each entry name, recursively, so a
//! collection of any size is a shallow tree of small objects.
//!
//! The layout is canonical: any set of nodes has exactly one tree shape and
//! therefore one id, regardless of the edit history that produced it. This is
//! what makes structural sharing and short-circuiting diffs possible.
//!
//! # Modules
//!
//! - [`config`]: [`TreeConfig`]: split threshold and bucket width
//! - [`builder`]: [`RevTreeBuilder`]: applies edits to a base tree
//! - [`lookup`]: [`find_node`], [`collect_nodes`] and the lazy [`NodeIter`]
//! - [`error`]: [`TreeError`]

pub mod builder;
pub mod config;
pub mod error;
pub mod lookup;

pub use builder::RevTreeBuilder;
pub use config::TreeConfig;
pub use error::{TreeError, TreeResult};
pub use lookup::{collect_nodes, find_node, NodeIter};
