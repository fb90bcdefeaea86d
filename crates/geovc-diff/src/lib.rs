//! Diff engine for geovc.
//!
//! Compares two revision trees without materializing either. Identical
//! subtrees (equal ids) are skipped outright, so the cost of a diff tracks the
//! size of the change rather than the size of the trees.
//!
//! # Key Types
//!
//! - [`DiffStream`]: lazy iterator of changes between two trees
//! - [`DiffEntry`]: one added, removed or modified entry
//! - [`DiffOptions`]: recursion, spatial filter and cancellation
//! - [`DiffCounts`]: per-kind change totals

pub mod entry;
pub mod error;
pub mod tree_diff;

pub use entry::{ChangeType, DiffCounts, DiffEntry};
pub use error::{DiffError, DiffResult};
pub use tree_diff::{count_changes, diff_trees, DiffOptions, DiffStream};
