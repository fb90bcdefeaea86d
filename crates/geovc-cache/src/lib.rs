//! Shared object cache for geovc.
//!
//! Tree traversal touches the same interior trees over and over, so every
//! read goes through a process-wide [`SharedCache`] with two tiers:
//!
//! - **L1** holds decoded [`RevObject`](geovc_store::RevObject)s, bounded by
//!   entry count.
//! - **L2** holds canonical encodings, bounded by total bytes.
//!
//! Both tiers are split into independently locked segments. Each segment
//! owns a fixed share of the configured capacity and evicts inside the same
//! critical section as the insert, so the global bounds hold at every
//! instant.
//!
//! [`ObjectDatabase`] combines an [`ObjectStore`](geovc_store::ObjectStore)
//! with a shared cache and is the only way the rest of geovc reads objects.
//! Each database caches under its own [`CacheScope`], so repositories that
//! share one cache still only ever read back objects their own store holds.

pub mod config;
pub mod database;
pub mod error;
pub mod shared;

pub use config::{parse_size, CacheConfig};
pub use database::ObjectDatabase;
pub use error::{CacheError, CacheResult};
pub use shared::{CacheScope, CacheStats, SharedCache};
