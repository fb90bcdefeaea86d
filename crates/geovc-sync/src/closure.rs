//! Computing the objects a destination lacks.

use std::collections::{HashSet, VecDeque};

use geovc_cache::ObjectDatabase;
use geovc_store::{RevObject, StoreError, TreeLayout};
use geovc_types::{ObjectId, ObjectKind};
use tracing::debug;

use crate::error::SyncResult;

/// Objects to copy, in discovery order, plus where history was cut short.
#[derive(Clone, Debug, Default)]
pub struct Closure {
    pub ids: Vec<ObjectId>,
    pub commits: usize,
    /// Commits whose parents were left out.
    pub shallow: Vec<ObjectId>,
}

impl Closure {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Walks everything reachable from a set of tips in `source` that `target`
/// does not already hold.
///
/// A commit or tree present in `target` is assumed to have its whole closure
/// present too, so the walk stops there.
pub struct MissingObjects<'a> {
    source: &'a ObjectDatabase,
    target: &'a ObjectDatabase,
    depth_limit: Option<usize>,
    seen: HashSet<ObjectId>,
    closure: Closure,
}

impl<'a> MissingObjects<'a> {
    pub fn new(source: &'a ObjectDatabase, target: &'a ObjectDatabase) -> Self {
        Self {
            source,
            target,
            depth_limit: None,
            seen: HashSet::new(),
            closure: Closure::default(),
        }
    }

    /// Follow at most `depth` commits from each tip.
    pub fn depth_limit(mut self, depth: Option<usize>) -> Self {
        self.depth_limit = depth;
        self
    }

    /// Walk from `tips`, which may be commits or tags.
    pub fn collect(mut self, tips: &[ObjectId]) -> SyncResult<Closure> {
        let mut commits: VecDeque<(ObjectId, usize)> = VecDeque::new();
        for tip in tips {
            if !self.wanted(*tip)? {
                continue;
            }
            match self.source.get(tip)? {
                RevObject::Tag(tag) => {
                    self.closure.ids.push(*tip);
                    commits.push_back((tag.commit, 1));
                }
                _ => {
                    self.seen.remove(tip);
                    commits.push_back((*tip, 1));
                }
            }
        }

        while let Some((id, depth)) = commits.pop_front() {
            if !self.wanted(id)? {
                continue;
            }
            let commit = match self.source.get_commit(&id) {
                Ok(commit) => commit,
                // A shallow source can only serve what it has.
                Err(StoreError::NotFound(_)) if self.depth_limit.is_some() && depth > 1 => {
                    self.seen.remove(&id);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            self.closure.ids.push(id);
            self.closure.commits += 1;
            self.walk_tree(commit.tree)?;

            if self.depth_limit.is_some_and(|limit| depth >= limit) {
                if !commit.parents.is_empty() {
                    self.closure.shallow.push(id);
                }
                continue;
            }
            commits.extend(commit.parents.iter().map(|p| (*p, depth + 1)));
        }

        debug!(
            objects = self.closure.ids.len(),
            commits = self.closure.commits,
            shallow = self.closure.shallow.len(),
            "computed missing objects"
        );
        Ok(self.closure)
    }

    /// Marks `id` as visited; `false` if already visited or held by the
    /// target.
    fn wanted(&mut self, id: ObjectId) -> SyncResult<bool> {
        if !self.seen.insert(id) {
            return Ok(false);
        }
        Ok(!self.target.has(&id)?)
    }

    fn walk_tree(&mut self, root: ObjectId) -> SyncResult<()> {
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            if !self.wanted(id)? {
                continue;
            }
            let tree = self.source.get_tree(&id)?;
            self.closure.ids.push(id);
            match tree.layout() {
                TreeLayout::Buckets { buckets, .. } => {
                    pending.extend(buckets.values().map(|b| b.tree_id));
                }
                TreeLayout::Leaf(nodes) => {
                    for node in nodes {
                        if let Some(metadata) = node.metadata_id() {
                            self.add_leaf(metadata, ObjectKind::FeatureType)?;
                        }
                        if node.is_tree() {
                            pending.push(node.object_id());
                        } else {
                            self.add_leaf(node.object_id(), ObjectKind::Feature)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn add_leaf(&mut self, id: ObjectId, kind: ObjectKind) -> SyncResult<()> {
        if self.wanted(id)? {
            if !self.source.has(&id)? {
                debug!(object = %id.short_hex(), %kind, "referenced object missing from source");
                return Err(StoreError::NotFound(id).into());
            }
            self.closure.ids.push(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geovc_cache::{CacheConfig, SharedCache};
    use geovc_store::{Commit, Feature, FeatureType, InMemoryObjectStore, Node, Person, RevTree, Tag, Value};
    use geovc_tree::{RevTreeBuilder, TreeConfig};
    use geovc_types::CancelToken;
    use std::sync::Arc;

    fn db() -> ObjectDatabase {
        ObjectDatabase::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(SharedCache::new(CacheConfig::disabled()).unwrap()),
        )
    }

    fn person() -> Person {
        Person::new("t", "t@example.com", 0, 0)
    }

    /// A commit whose tree holds `n` fresh features tagged with `label`.
    fn commit(db: &ObjectDatabase, parents: Vec<ObjectId>, label: &str, n: usize) -> ObjectId {
        let schema = db.put(FeatureType::new("points", vec![])).unwrap();
        let mut builder = RevTreeBuilder::new(db.clone(), TreeConfig::new(4, 2).unwrap()).unwrap();
        for i in 0..n {
            let fid = db
                .put(Feature::new(vec![Value::from(format!("{label}-{i}"))]))
                .unwrap();
            builder
                .put(Node::feature(format!("{label}{i}"), fid).with_metadata(schema))
                .unwrap();
        }
        let tree = builder.build(&CancelToken::new()).unwrap().completed().unwrap();
        db.put(Commit::new(tree.id(), parents, person(), person(), label))
            .unwrap()
    }

    #[test]
    fn everything_is_missing_from_empty_target() {
        let source = db();
        let target = db();
        let c1 = commit(&source, vec![], "a", 10);
        let closure = MissingObjects::new(&source, &target).collect(&[c1]).unwrap();
        assert_eq!(closure.commits, 1);
        let mut ids = closure.ids.clone();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), closure.ids.len());
        for id in &closure.ids {
            assert!(source.has(id).unwrap());
        }
        assert!(closure.ids.contains(&c1));
        assert!(closure.shallow.is_empty());
    }

    #[test]
    fn objects_already_in_target_are_skipped() {
        let source = db();
        let target = db();
        let c1 = commit(&source, vec![], "a", 10);
        let first = MissingObjects::new(&source, &target).collect(&[c1]).unwrap();
        for id in &first.ids {
            target.put_verified(*id, &source.raw(id).unwrap()).unwrap();
        }
        let c2 = commit(&source, vec![c1], "b", 3);
        let second = MissingObjects::new(&source, &target).collect(&[c2]).unwrap();
        assert_eq!(second.commits, 1);
        assert!(!second.ids.contains(&c1));
        assert!(second.ids.iter().all(|id| !first.ids.contains(id)));

        assert!(MissingObjects::new(&source, &target)
            .collect(&[c1])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn depth_limit_marks_shallow_commits() {
        let source = db();
        let target = db();
        let c1 = commit(&source, vec![], "a", 2);
        let c2 = commit(&source, vec![c1], "b", 2);
        let c3 = commit(&source, vec![c2], "c", 2);
        let closure = MissingObjects::new(&source, &target)
            .depth_limit(Some(2))
            .collect(&[c3])
            .unwrap();
        assert_eq!(closure.commits, 2);
        assert_eq!(closure.shallow, vec![c2]);
        assert!(!closure.ids.contains(&c1));
    }

    #[test]
    fn tags_bring_their_commit() {
        let source = db();
        let target = db();
        let c1 = commit(&source, vec![], "a", 1);
        let tag = source
            .put(Tag {
                name: "v1".into(),
                commit: c1,
                message: "release".into(),
                tagger: person(),
            })
            .unwrap();
        let closure = MissingObjects::new(&source, &target).collect(&[tag]).unwrap();
        assert_eq!(closure.ids[0], tag);
        assert!(closure.ids.contains(&c1));
    }

    #[test]
    fn missing_feature_in_source_is_an_error() {
        let source = db();
        let target = db();
        let tree = source
            .put(RevTree::leaf(vec![Node::feature("ghost", ObjectId::from_bytes(b"ghost"))]))
            .unwrap();
        let c = source
            .put(Commit::new(tree, vec![], person(), person(), "broken"))
            .unwrap();
        assert!(MissingObjects::new(&source, &target).collect(&[c]).is_err());
    }
}
