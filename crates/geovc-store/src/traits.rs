use geovc_types::ObjectId;

use crate::error::{StoreError, StoreResult};

/// How bulk reads treat ids that are not in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BulkMode {
    /// Skip missing ids silently.
    #[default]
    Lenient,
    /// Fail with [`StoreError::NotFound`] on the first missing id.
    Strict,
}

/// Content-addressed object store holding canonical encodings.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written. `put` of an id that is already
///   present is a no-op and never replaces the stored bytes.
/// - Concurrent reads are always safe.
/// - The store never interprets object contents: it is a pure key-value
///   store keyed by [`ObjectId`].
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read an object's bytes, or `Ok(None)` if it does not exist.
    fn get_if_present(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>>;

    /// Store bytes under `id`. Returns `true` if the object was newly
    /// inserted, `false` if it was already present.
    fn put(&self, id: ObjectId, bytes: &[u8]) -> StoreResult<bool>;

    /// Check whether an object exists in the store.
    fn has(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Delete an object by ID. Returns `true` if the object existed.
    ///
    /// This is intended for garbage collection only. Deletion of
    /// referenced objects can corrupt the repository.
    fn delete(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Read an object's bytes, failing with [`StoreError::NotFound`] when absent.
    fn get(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        self.get_if_present(id)?.ok_or(StoreError::NotFound(*id))
    }

    /// Read many objects. Result order is not guaranteed to follow `ids`.
    ///
    /// Default implementation calls `get_if_present()` for each ID. Backends
    /// may override for better performance.
    fn get_all(&self, ids: &[ObjectId], mode: BulkMode) -> StoreResult<Vec<(ObjectId, Vec<u8>)>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_if_present(id)? {
                Some(bytes) => found.push((*id, bytes)),
                None if mode == BulkMode::Strict => return Err(StoreError::NotFound(*id)),
                None => {}
            }
        }
        Ok(found)
    }

    /// Store many objects. Returns how many were newly inserted.
    fn put_all(&self, objects: &[(ObjectId, Vec<u8>)]) -> StoreResult<usize> {
        let mut inserted = 0;
        for (id, bytes) in objects {
            if self.put(*id, bytes)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
