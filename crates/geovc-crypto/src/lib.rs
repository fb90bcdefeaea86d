//! Hashing primitives for geovc.
//!
//! Provides domain-separated BLAKE3 hashing of canonical object encodings and
//! the name hash used to route tree entries into buckets.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod hasher;
pub mod name;

pub use hasher::ContentHasher;
pub use name::NameHash;
