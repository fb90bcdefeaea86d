//! Foundation types for geovc.
//!
//! This crate provides the identity and control types shared by every other
//! geovc crate.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Content-addressed identifier (BLAKE3 hash of a canonical encoding)
//! - [`ObjectKind`]: Tag distinguishing commits, trees, features, feature types and tags
//! - [`CancelToken`]: Cooperative cancellation flag shared across threads
//! - [`Outcome`]: Result of a cancellable operation

pub mod cancel;
pub mod error;
pub mod kind;
pub mod object;

pub use cancel::{CancelToken, Outcome};
pub use error::TypeError;
pub use kind::ObjectKind;
pub use object::ObjectId;
