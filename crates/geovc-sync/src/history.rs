use std::collections::{HashSet, VecDeque};

use geovc_cache::ObjectDatabase;
use geovc_types::ObjectId;

use crate::error::SyncResult;

/// `true` if `ancestor` is reachable from `descendant` through parent links,
/// or the two are equal. Commits missing from `db` end their branch of the
/// search, so shallow history answers `false` rather than failing.
pub fn is_ancestor(db: &ObjectDatabase, ancestor: ObjectId, descendant: ObjectId) -> SyncResult<bool> {
    let mut queue = VecDeque::from([descendant]);
    let mut seen = HashSet::new();
    while let Some(id) = queue.pop_front() {
        if id == ancestor {
            return Ok(true);
        }
        if !seen.insert(id) || !db.has(&id)? {
            continue;
        }
        queue.extend(db.get_commit(&id)?.parents.iter().copied());
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geovc_cache::{CacheConfig, SharedCache};
    use geovc_store::{Commit, InMemoryObjectStore, Person, RevTree};
    use std::sync::Arc;

    fn commit(db: &ObjectDatabase, parents: Vec<ObjectId>, message: &str) -> ObjectId {
        let person = Person::new("t", "t@example.com", 0, 0);
        db.put(Commit::new(RevTree::empty_id(), parents, person.clone(), person, message))
            .unwrap()
    }

    #[test]
    fn linear_and_merge_history() {
        let db = ObjectDatabase::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(SharedCache::new(CacheConfig::default()).unwrap()),
        );
        let root = commit(&db, vec![], "root");
        let a = commit(&db, vec![root], "a");
        let b = commit(&db, vec![root], "b");
        let merge = commit(&db, vec![a, b], "merge");

        assert!(is_ancestor(&db, root, merge).unwrap());
        assert!(is_ancestor(&db, b, merge).unwrap());
        assert!(is_ancestor(&db, a, a).unwrap());
        assert!(!is_ancestor(&db, a, b).unwrap());
        assert!(!is_ancestor(&db, merge, root).unwrap());
        assert!(!is_ancestor(&db, ObjectId::from_bytes(b"elsewhere"), merge).unwrap());
    }
}
