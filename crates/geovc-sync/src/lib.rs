//! Synchronization between geovc repositories.
//!
//! A transfer walks the history reachable from a ref, skips everything the
//! receiving side already has, ships the rest as an [`ObjectBundle`] and
//! finally moves the destination ref with compare-and-swap. Every received
//! object is re-hashed before it is stored.

pub mod bundle;
pub mod closure;
pub mod error;
pub mod history;
pub mod progress;
pub mod remote;
pub mod types;

pub use bundle::ObjectBundle;
pub use closure::{Closure, MissingObjects};
pub use error::{SyncError, SyncResult};
pub use history::is_ancestor;
pub use progress::{NullProgress, ProgressListener};
pub use remote::{Endpoint, LocalRemote, Remote};
pub use types::{FetchResult, PushResult, RefSpec, RefUpdate};
