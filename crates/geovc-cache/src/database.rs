use std::sync::Arc;

use geovc_store::{
    codec, Commit, Feature, FeatureType, ObjectStore, RevObject, RevTree, StoreError, StoreResult,
    Tag,
};
use geovc_types::{ObjectId, ObjectKind};
use tracing::trace;

use crate::shared::{CacheScope, SharedCache};

/// Read-through, write-through object access backed by a [`SharedCache`].
///
/// The store is authoritative; the cache only speeds up reads of objects the
/// store holds. Cloning is cheap: clones share the same store, cache and
/// cache scope.
#[derive(Clone)]
pub struct ObjectDatabase {
    store: Arc<dyn ObjectStore>,
    cache: Arc<SharedCache>,
    scope: CacheScope,
}

impl ObjectDatabase {
    pub fn new(store: Arc<dyn ObjectStore>, cache: Arc<SharedCache>) -> Self {
        let scope = cache.new_scope();
        Self {
            store,
            cache,
            scope,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<SharedCache> {
        &self.cache
    }

    /// The partition of the shared cache this database reads and fills.
    pub fn scope(&self) -> CacheScope {
        self.scope
    }

    /// Fetch and decode an object, failing with [`StoreError::NotFound`].
    pub fn get(&self, id: &ObjectId) -> StoreResult<RevObject> {
        self.get_if_present(id)?.ok_or(StoreError::NotFound(*id))
    }

    /// Fetch and decode an object if it exists.
    ///
    /// The empty tree is always present, whether or not it was ever stored.
    pub fn get_if_present(&self, id: &ObjectId) -> StoreResult<Option<RevObject>> {
        if let Some(object) = self.cache.lookup(self.scope, id) {
            return Ok(Some(object));
        }
        if *id == RevTree::empty_id() {
            return Ok(Some(RevTree::empty().into()));
        }
        let Some(bytes) = self.store.get_if_present(id)? else {
            return Ok(None);
        };
        let object = codec::decode_verified(id, &bytes)?;
        trace!(object = %id.short_hex(), kind = %object.kind(), "cache fill");
        self.cache.put(self.scope, *id, object.clone(), bytes.into());
        Ok(Some(object))
    }

    /// Fetch an object that must be of `kind`.
    pub fn get_kind(&self, id: &ObjectId, kind: ObjectKind) -> StoreResult<RevObject> {
        let object = self.get(id)?;
        if object.kind() != kind {
            return Err(kind_mismatch(id, &object, kind));
        }
        Ok(object)
    }

    pub fn get_tree(&self, id: &ObjectId) -> StoreResult<Arc<RevTree>> {
        let object = self.get(id)?;
        object
            .as_tree()
            .cloned()
            .ok_or_else(|| kind_mismatch(id, &object, ObjectKind::Tree))
    }

    pub fn get_commit(&self, id: &ObjectId) -> StoreResult<Arc<Commit>> {
        let object = self.get(id)?;
        object
            .as_commit()
            .cloned()
            .ok_or_else(|| kind_mismatch(id, &object, ObjectKind::Commit))
    }

    pub fn get_feature(&self, id: &ObjectId) -> StoreResult<Arc<Feature>> {
        let object = self.get(id)?;
        object
            .as_feature()
            .cloned()
            .ok_or_else(|| kind_mismatch(id, &object, ObjectKind::Feature))
    }

    pub fn get_feature_type(&self, id: &ObjectId) -> StoreResult<Arc<FeatureType>> {
        let object = self.get(id)?;
        object
            .as_feature_type()
            .cloned()
            .ok_or_else(|| kind_mismatch(id, &object, ObjectKind::FeatureType))
    }

    pub fn get_tag(&self, id: &ObjectId) -> StoreResult<Arc<Tag>> {
        let object = self.get(id)?;
        object
            .as_tag()
            .cloned()
            .ok_or_else(|| kind_mismatch(id, &object, ObjectKind::Tag))
    }

    /// Encode, store and cache an object. Idempotent.
    pub fn put(&self, object: impl Into<RevObject>) -> StoreResult<ObjectId> {
        let object = object.into();
        let bytes = codec::encode(&object);
        let id = codec::object_id(object.kind(), &bytes);
        self.store.put(id, &bytes)?;
        self.cache.put(self.scope, id, object, bytes.into());
        Ok(id)
    }

    /// Store a tree and hand back a shared handle to it.
    pub fn put_tree(&self, tree: RevTree) -> StoreResult<Arc<RevTree>> {
        let tree = Arc::new(tree);
        self.put(Arc::clone(&tree))?;
        Ok(tree)
    }

    /// True if the store holds `id`. The empty tree is always present.
    pub fn has(&self, id: &ObjectId) -> StoreResult<bool> {
        if *id == RevTree::empty_id() {
            return Ok(true);
        }
        self.store.has(id)
    }

    /// Raw canonical bytes, bypassing decode.
    pub fn raw(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        if *id == RevTree::empty_id() {
            return Ok(codec::encode(&RevTree::empty().into()));
        }
        self.store.get(id)
    }

    /// Store bytes received from elsewhere after checking they decode and
    /// hash to `id`. Returns `true` if newly inserted.
    pub fn put_verified(&self, id: ObjectId, bytes: &[u8]) -> StoreResult<bool> {
        let object = codec::decode_verified(&id, bytes)?;
        let inserted = self.store.put(id, bytes)?;
        self.cache.put_decoded(self.scope, id, object);
        Ok(inserted)
    }
}

fn kind_mismatch(id: &ObjectId, found: &RevObject, expected: ObjectKind) -> StoreError {
    StoreError::CorruptEncoding(format!(
        "{} is a {}, expected {expected}",
        id.short_hex(),
        found.kind()
    ))
}

impl std::fmt::Debug for ObjectDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDatabase")
            .field("scope", &self.scope)
            .field("cache", &self.cache.stats())
            .finish_non_exhaustive()
    }
}
