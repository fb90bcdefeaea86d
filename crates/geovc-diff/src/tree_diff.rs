use std::collections::{BTreeMap, BTreeSet};

use geovc_cache::ObjectDatabase;
use geovc_crypto::NameHash;
use geovc_store::{Bucket, Extent, Node, TreeLayout};
use geovc_types::{CancelToken, ObjectId, Outcome};
use tracing::debug;

use crate::entry::{join_path, DiffCounts, DiffEntry};
use crate::error::{DiffError, DiffResult};

/// Knobs for a diff run.
#[derive(Clone, Debug, Default)]
pub struct DiffOptions {
    /// Descend into TREE entries and report the changes beneath them.
    pub recursive: bool,
    /// Only report changes whose known extents intersect this box.
    pub bounds: Option<Extent>,
    pub cancel: CancelToken,
}

impl DiffOptions {
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn bounds(mut self, bounds: Extent) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn excludes(&self, extent: Option<Extent>) -> bool {
        match (&self.bounds, extent) {
            (Some(bounds), Some(extent)) => !bounds.intersects(&extent),
            _ => false,
        }
    }

    /// A bucket's extent is only recorded when it bounds every entry below,
    /// so a disjoint one cannot hide a change without an extent.
    fn excludes_bucket(&self, bucket: Option<&Bucket>) -> bool {
        match bucket {
            None => true,
            Some(b) => b.extent.is_some() && self.excludes(b.extent),
        }
    }

    fn excludes_entry(&self, entry: &DiffEntry) -> bool {
        if self.bounds.is_none() {
            return false;
        }
        let old = entry.old().map(|n| self.excludes(n.extent()));
        let new = entry.new().map(|n| self.excludes(n.extent()));
        old.unwrap_or(true) && new.unwrap_or(true)
    }
}

/// One side of a pending comparison.
#[derive(Debug)]
enum Side {
    Empty,
    Tree(ObjectId),
    /// Leaf entries regrouped under one bucket of the other side.
    Nodes(Vec<Node>),
}

impl Side {
    fn tree_id(&self) -> Option<ObjectId> {
        match self {
            Side::Tree(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Frame {
    path: String,
    depth: u32,
    left: Side,
    right: Side,
}

#[derive(Debug)]
enum Work {
    Emit(DiffEntry),
    Compare(Frame),
}

/// A tree side after loading, ready for comparison.
enum Loaded {
    Buckets { bits: u8, buckets: BTreeMap<u32, Bucket> },
    Nodes(Vec<Node>),
}

/// Lazy stream of the changes turning `left` into `right`.
///
/// Holds a stack of pending work; only the trees of the frame being expanded
/// are loaded at any time. Stops at the first error.
pub struct DiffStream {
    db: ObjectDatabase,
    options: DiffOptions,
    stack: Vec<Work>,
    cancelled: bool,
}

impl DiffStream {
    pub fn new(db: ObjectDatabase, left: ObjectId, right: ObjectId, options: DiffOptions) -> Self {
        let mut stack = Vec::new();
        if left != right {
            stack.push(Work::Compare(Frame {
                path: String::new(),
                depth: 0,
                left: Side::Tree(left),
                right: Side::Tree(right),
            }));
        }
        Self {
            db,
            options,
            stack,
            cancelled: false,
        }
    }

    /// `true` if the stream ended early because its token was cancelled.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Drain the stream into a vector.
    pub fn collect_entries(mut self) -> DiffResult<Outcome<Vec<DiffEntry>>> {
        let mut entries = Vec::new();
        for entry in self.by_ref() {
            entries.push(entry?);
        }
        if self.cancelled {
            return Ok(Outcome::Cancelled);
        }
        Ok(Outcome::Completed(entries))
    }

    /// Drain the stream, counting changes by type.
    pub fn counts(mut self) -> DiffResult<Outcome<DiffCounts>> {
        let mut counts = DiffCounts::default();
        for entry in self.by_ref() {
            counts.record(&entry?);
        }
        if self.cancelled {
            return Ok(Outcome::Cancelled);
        }
        Ok(Outcome::Completed(counts))
    }

    fn load(&self, side: Side) -> DiffResult<Loaded> {
        match side {
            Side::Empty => Ok(Loaded::Nodes(Vec::new())),
            Side::Nodes(nodes) => Ok(Loaded::Nodes(nodes)),
            Side::Tree(id) => {
                let tree = self.db.get_tree(&id)?;
                Ok(match tree.layout() {
                    TreeLayout::Leaf(nodes) => Loaded::Nodes(nodes.clone()),
                    TreeLayout::Buckets { bits, buckets } => Loaded::Buckets {
                        bits: *bits,
                        buckets: buckets.clone(),
                    },
                })
            }
        }
    }

    /// Replace a frame with the work it breaks down into.
    fn expand(&mut self, frame: Frame) -> DiffResult<()> {
        let Frame {
            path,
            depth,
            left,
            right,
        } = frame;
        let left = self.load(left)?;
        let right = self.load(right)?;

        let mut work = Vec::new();
        match (left, right) {
            (Loaded::Nodes(left), Loaded::Nodes(right)) => {
                self.compare_nodes(&path, left, right, &mut work);
            }
            (
                Loaded::Buckets {
                    bits: left_bits,
                    buckets: left,
                },
                Loaded::Buckets {
                    bits: right_bits,
                    buckets: right,
                },
            ) => {
                if left_bits != right_bits {
                    return Err(DiffError::UnsupportedFormat(format!(
                        "cannot compare {left_bits}-bit and {right_bits}-bit buckets at {path:?}"
                    )));
                }
                let indexes: BTreeSet<u32> = left.keys().chain(right.keys()).copied().collect();
                for index in indexes {
                    let (l, r) = (left.get(&index), right.get(&index));
                    if let (Some(l), Some(r)) = (l, r) {
                        if l.tree_id == r.tree_id {
                            continue;
                        }
                    }
                    if self.options.excludes_bucket(l) && self.options.excludes_bucket(r) {
                        continue;
                    }
                    work.push(Work::Compare(Frame {
                        path: path.clone(),
                        depth: depth + 1,
                        left: l.map_or(Side::Empty, |b| Side::Tree(b.tree_id)),
                        right: r.map_or(Side::Empty, |b| Side::Tree(b.tree_id)),
                    }));
                }
            }
            (Loaded::Buckets { bits, buckets }, Loaded::Nodes(nodes)) => {
                let mut groups = regroup(nodes, depth, bits)?;
                let indexes: BTreeSet<u32> = buckets.keys().chain(groups.keys()).copied().collect();
                for index in indexes {
                    work.push(Work::Compare(Frame {
                        path: path.clone(),
                        depth: depth + 1,
                        left: buckets.get(&index).map_or(Side::Empty, |b| Side::Tree(b.tree_id)),
                        right: groups.remove(&index).map_or(Side::Empty, Side::Nodes),
                    }));
                }
            }
            (Loaded::Nodes(nodes), Loaded::Buckets { bits, buckets }) => {
                let mut groups = regroup(nodes, depth, bits)?;
                let indexes: BTreeSet<u32> = buckets.keys().chain(groups.keys()).copied().collect();
                for index in indexes {
                    work.push(Work::Compare(Frame {
                        path: path.clone(),
                        depth: depth + 1,
                        left: groups.remove(&index).map_or(Side::Empty, Side::Nodes),
                        right: buckets.get(&index).map_or(Side::Empty, |b| Side::Tree(b.tree_id)),
                    }));
                }
            }
        }

        // Reverse so the first item is popped next.
        self.stack.extend(work.into_iter().rev());
        Ok(())
    }

    fn compare_nodes(&self, path: &str, left: Vec<Node>, right: Vec<Node>, work: &mut Vec<Work>) {
        let mut left = left.into_iter().peekable();
        let mut right = right.into_iter().peekable();
        loop {
            let order = match (left.peek(), right.peek()) {
                (None, None) => break,
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (Some(l), Some(r)) => l.name().cmp(r.name()),
            };
            match order {
                std::cmp::Ordering::Less => {
                    if let Some(node) = left.next() {
                        self.removed(path, node, work);
                    }
                }
                std::cmp::Ordering::Greater => {
                    if let Some(node) = right.next() {
                        self.added(path, node, work);
                    }
                }
                std::cmp::Ordering::Equal => {
                    if let (Some(old), Some(new)) = (left.next(), right.next()) {
                        self.changed(path, old, new, work);
                    }
                }
            }
        }
    }

    fn added(&self, path: &str, node: Node, work: &mut Vec<Work>) {
        if self.options.recursive && node.is_tree() {
            work.push(Work::Compare(Frame {
                path: join_path(path, node.name()),
                depth: 0,
                left: Side::Empty,
                right: Side::Tree(node.object_id()),
            }));
        } else {
            self.emit(
                DiffEntry::Added {
                    path: path.to_owned(),
                    node,
                },
                work,
            );
        }
    }

    fn removed(&self, path: &str, node: Node, work: &mut Vec<Work>) {
        if self.options.recursive && node.is_tree() {
            work.push(Work::Compare(Frame {
                path: join_path(path, node.name()),
                depth: 0,
                left: Side::Tree(node.object_id()),
                right: Side::Empty,
            }));
        } else {
            self.emit(
                DiffEntry::Removed {
                    path: path.to_owned(),
                    node,
                },
                work,
            );
        }
    }

    fn changed(&self, path: &str, old: Node, new: Node, work: &mut Vec<Work>) {
        if !old.content_differs(&new) {
            return;
        }
        if self.options.recursive && (old.is_tree() || new.is_tree()) {
            if old.is_tree() && new.is_tree() {
                if old.object_id() == new.object_id() {
                    // Same contents, metadata or extent changed.
                    self.emit(
                        DiffEntry::Modified {
                            path: path.to_owned(),
                            old,
                            new,
                        },
                        work,
                    );
                } else {
                    work.push(Work::Compare(Frame {
                        path: join_path(path, new.name()),
                        depth: 0,
                        left: Side::Tree(old.object_id()),
                        right: Side::Tree(new.object_id()),
                    }));
                }
            } else {
                // A feature replaced by a tree or the reverse.
                self.removed(path, old, work);
                self.added(path, new, work);
            }
            return;
        }
        self.emit(
            DiffEntry::Modified {
                path: path.to_owned(),
                old,
                new,
            },
            work,
        );
    }

    fn emit(&self, entry: DiffEntry, work: &mut Vec<Work>) {
        if !self.options.excludes_entry(&entry) {
            work.push(Work::Emit(entry));
        }
    }
}

impl Iterator for DiffStream {
    type Item = DiffResult<DiffEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.stack.pop()? {
                Work::Emit(entry) => return Some(Ok(entry)),
                Work::Compare(frame) => {
                    if self.options.cancel.is_cancelled() {
                        debug!(pending = self.stack.len() + 1, "diff cancelled");
                        self.cancelled = true;
                        self.stack.clear();
                        return None;
                    }
                    if frame.left.tree_id().is_some() && frame.left.tree_id() == frame.right.tree_id() {
                        continue;
                    }
                    if let Err(e) = self.expand(frame) {
                        self.stack.clear();
                        return Some(Err(e));
                    }
                }
            }
        }
    }
}

/// Split sorted leaf entries by the bucket they would occupy at `depth`.
fn regroup(nodes: Vec<Node>, depth: u32, bits: u8) -> DiffResult<BTreeMap<u32, Vec<Node>>> {
    let mut groups: BTreeMap<u32, Vec<Node>> = BTreeMap::new();
    for node in nodes {
        let index = NameHash::of(node.name()).bucket(depth, bits).ok_or_else(|| {
            DiffError::UnsupportedFormat(format!("bucket tree below maximum depth {depth}"))
        })?;
        groups.entry(index).or_default().push(node);
    }
    Ok(groups)
}

/// Diff two trees with default options.
pub fn diff_trees(db: &ObjectDatabase, left: ObjectId, right: ObjectId) -> DiffStream {
    DiffStream::new(db.clone(), left, right, DiffOptions::default())
}

/// Count the changes between two trees without keeping them.
pub fn count_changes(
    db: &ObjectDatabase,
    left: ObjectId,
    right: ObjectId,
    options: DiffOptions,
) -> DiffResult<Outcome<DiffCounts>> {
    DiffStream::new(db.clone(), left, right, options).counts()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use geovc_cache::{CacheConfig, SharedCache};
    use geovc_store::{InMemoryObjectStore, ObjectStore, RevTree, StoreError};
    use geovc_tree::{RevTreeBuilder, TreeConfig};

    use crate::entry::ChangeType;

    fn db() -> ObjectDatabase {
        ObjectDatabase::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(SharedCache::new(CacheConfig::default()).unwrap()),
        )
    }

    fn config() -> TreeConfig {
        TreeConfig::new(8, 2).unwrap()
    }

    fn feature(name: &str, version: u32) -> Node {
        Node::feature(name, ObjectId::from_bytes(format!("{name}@{version}").as_bytes()))
    }

    fn build(db: &ObjectDatabase, base: Arc<RevTree>, edits: Vec<(String, Option<Node>)>) -> Arc<RevTree> {
        let mut builder = RevTreeBuilder::from_base(db.clone(), config(), base).unwrap();
        for (name, node) in edits {
            match node {
                Some(node) => {
                    builder.put(node).unwrap();
                }
                None => {
                    builder.remove(&name);
                }
            }
        }
        builder.build(&CancelToken::new()).unwrap().completed().unwrap()
    }

    fn features(db: &ObjectDatabase, n: u32) -> Arc<RevTree> {
        let edits = (0..n)
            .map(|i| {
                let name = format!("f{i}");
                (name.clone(), Some(feature(&name, 0)))
            })
            .collect();
        build(db, Arc::new(RevTree::empty()), edits)
    }

    fn entries(db: &ObjectDatabase, left: &RevTree, right: &RevTree) -> Vec<DiffEntry> {
        diff_trees(db, left.id(), right.id())
            .collect::<DiffResult<Vec<_>>>()
            .unwrap()
    }

    fn sorted_keys(entries: &[DiffEntry]) -> Vec<(String, ChangeType)> {
        let mut keys: Vec<_> = entries
            .iter()
            .map(|e| (e.full_path(), e.change_type()))
            .collect();
        keys.sort();
        keys
    }

    // ---- basic properties ----

    #[test]
    fn diff_with_self_is_empty() {
        let db = db();
        for n in [0, 3, 100] {
            let tree = features(&db, n);
            assert!(entries(&db, &tree, &tree).is_empty());
        }
    }

    #[test]
    fn single_modification_is_reported_once() {
        let db = db();
        for n in [5, 100] {
            let before = features(&db, n);
            let after = build(&db, before.clone(), vec![("f3".into(), Some(feature("f3", 1)))]);
            let diff = entries(&db, &before, &after);
            assert_eq!(diff.len(), 1);
            match &diff[0] {
                DiffEntry::Modified { path, old, new } => {
                    assert_eq!(path, "");
                    assert_eq!(old, &feature("f3", 0));
                    assert_eq!(new, &feature("f3", 1));
                }
                other => panic!("unexpected entry {other:?}"),
            }
        }
    }

    #[test]
    fn additions_and_removals() {
        let db = db();
        let before = features(&db, 50);
        let after = build(
            &db,
            before.clone(),
            vec![
                ("f1".into(), None),
                ("f2".into(), None),
                ("new".into(), Some(feature("new", 0))),
            ],
        );
        let counts = count_changes(&db, before.id(), after.id(), DiffOptions::default())
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(
            counts,
            DiffCounts {
                added: 1,
                removed: 2,
                modified: 0
            }
        );
    }

    #[test]
    fn swapping_sides_inverts_entries() {
        let db = db();
        let a = features(&db, 40);
        let b = build(
            &db,
            a.clone(),
            vec![
                ("f0".into(), None),
                ("f7".into(), Some(feature("f7", 2))),
                ("x".into(), Some(feature("x", 0))),
            ],
        );
        let forward = entries(&db, &a, &b);
        let inverted: Vec<DiffEntry> = entries(&db, &b, &a).into_iter().map(DiffEntry::invert).collect();
        let mut forward_sorted = forward.clone();
        let mut inverted_sorted = inverted;
        forward_sorted.sort_by_key(|e| e.full_path());
        inverted_sorted.sort_by_key(|e| e.full_path());
        assert_eq!(forward_sorted, inverted_sorted);
        assert_eq!(forward.len(), 3);
    }

    #[test]
    fn leaf_against_bucket_tree() {
        let db = db();
        let small = features(&db, 5);
        let large = features(&db, 60);
        assert!(small.is_leaf());
        assert!(!large.is_leaf());

        let diff = entries(&db, &small, &large);
        assert_eq!(diff.len(), 55);
        assert!(diff.iter().all(|e| e.change_type() == ChangeType::Added));

        let back = entries(&db, &large, &small);
        assert_eq!(back.len(), 55);
        assert!(back.iter().all(|e| e.change_type() == ChangeType::Removed));
    }

    #[test]
    fn empty_tree_against_everything() {
        let db = db();
        let tree = features(&db, 30);
        let empty = RevTree::empty();
        let diff = entries(&db, &empty, &tree);
        assert_eq!(diff.len(), 30);
        let mut names: Vec<_> = diff.iter().map(|e| e.name().to_owned()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 30);
    }

    #[test]
    fn identical_subtrees_are_not_loaded() {
        let store = Arc::new(InMemoryObjectStore::new());
        let db = ObjectDatabase::new(
            store.clone(),
            Arc::new(SharedCache::new(CacheConfig::disabled()).unwrap()),
        );
        let before = features(&db, 100);
        let after = build(&db, before.clone(), vec![("f9".into(), Some(feature("f9", 1)))]);

        // Drop every bucket the edit did not touch; the diff must not need them.
        let left = before.buckets_map().unwrap();
        let right = after.buckets_map().unwrap();
        for (index, bucket) in left {
            if right.get(index).map(|b| b.tree_id) == Some(bucket.tree_id) {
                store.delete(&bucket.tree_id).unwrap();
            }
        }
        assert_eq!(entries(&db, &before, &after).len(), 1);
    }

    #[test]
    fn missing_tree_is_an_error() {
        let db = db();
        let tree = features(&db, 10);
        let missing = ObjectId::from_bytes(b"gone");
        let results: Vec<_> = diff_trees(&db, tree.id(), missing).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            Err(DiffError::Store(StoreError::NotFound(id))) if id == missing
        ));
    }

    #[test]
    fn mismatched_bucket_widths_are_rejected() {
        let db = db();
        let narrow = features(&db, 20);
        let mut wide = RevTreeBuilder::new(db.clone(), TreeConfig::new(8, 3).unwrap()).unwrap();
        for i in 0..20 {
            wide.put(feature(&format!("f{i}"), 1)).unwrap();
        }
        let wide = wide.build(&CancelToken::new()).unwrap().completed().unwrap();
        let result: DiffResult<Vec<_>> = diff_trees(&db, narrow.id(), wide.id()).collect();
        assert!(matches!(result, Err(DiffError::UnsupportedFormat(_))));
    }

    // ---- recursion ----

    fn nested(db: &ObjectDatabase, roads: &Arc<RevTree>) -> Arc<RevTree> {
        build(
            db,
            Arc::new(RevTree::empty()),
            vec![
                ("roads".into(), Some(Node::tree("roads", roads.id()))),
                ("readme".into(), Some(feature("readme", 0))),
            ],
        )
    }

    #[test]
    fn recursive_diff_reports_nested_paths() {
        let db = db();
        let roads = features(&db, 20);
        let roads2 = build(&db, roads.clone(), vec![("f4".into(), Some(feature("f4", 9)))]);
        let before = nested(&db, &roads);
        let after = nested(&db, &roads2);

        let flat = entries(&db, &before, &after);
        assert_eq!(flat.len(), 1);
        assert!(flat[0].new().unwrap().is_tree());

        let deep = DiffStream::new(
            db.clone(),
            before.id(),
            after.id(),
            DiffOptions::default().recursive(true),
        )
        .collect_entries()
        .unwrap()
        .completed()
        .unwrap();
        assert_eq!(deep.len(), 1);
        assert_eq!(deep[0].path(), "roads");
        assert_eq!(deep[0].full_path(), "roads/f4");
    }

    #[test]
    fn recursive_diff_expands_added_trees() {
        let db = db();
        let roads = features(&db, 12);
        let tree = nested(&db, &roads);
        let options = DiffOptions::default().recursive(true);
        let diff = DiffStream::new(db.clone(), RevTree::empty_id(), tree.id(), options)
            .collect_entries()
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(diff.len(), 13);
        assert!(diff.iter().all(|e| !e.new().unwrap().is_tree()));
        assert_eq!(
            sorted_keys(&diff).iter().filter(|(p, _)| p.starts_with("roads/")).count(),
            12
        );
    }

    // ---- spatial filter ----

    #[test]
    fn bounds_skip_disjoint_entries() {
        let db = db();
        let edits = (0..40)
            .map(|i| {
                let name = format!("p{i}");
                let node = feature(&name, 0).with_extent(Extent::point(i as f64, i as f64));
                (name, Some(node))
            })
            .collect();
        let tree = build(&db, Arc::new(RevTree::empty()), edits);
        let options = DiffOptions::default().bounds(Extent::new(0.0, 0.0, 9.5, 9.5));
        let diff = DiffStream::new(db.clone(), RevTree::empty_id(), tree.id(), options)
            .collect_entries()
            .unwrap()
            .completed()
            .unwrap();
        let mut names: Vec<_> = diff.iter().map(|e| e.name().to_owned()).collect();
        names.sort();
        let mut expected: Vec<_> = (0..10).map(|i| format!("p{i}")).collect();
        expected.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn bounds_keep_entries_without_extent() {
        let db = db();
        let tree = features(&db, 10);
        let options = DiffOptions::default().bounds(Extent::new(100.0, 100.0, 101.0, 101.0));
        let counts = count_changes(&db, RevTree::empty_id(), tree.id(), options)
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(counts.added, 10);
    }

    #[test]
    fn bounds_never_prune_buckets_holding_entries_without_extent() {
        let db = db();
        let far = Extent::point(100.0, 100.0);
        let mut edits: Vec<(String, Option<Node>)> = (0..64)
            .map(|i| {
                let name = format!("p{i}");
                (name.clone(), Some(feature(&name, 0).with_extent(far)))
            })
            .collect();
        edits.push(("plain".into(), Some(feature("plain", 0))));
        let before = build(&db, Arc::new(RevTree::empty()), edits);
        assert!(!before.is_leaf());
        let after = build(&db, before.clone(), vec![("plain".into(), Some(feature("plain", 1)))]);

        assert_eq!(entries(&db, &before, &after).len(), 1);
        let options = DiffOptions::default().bounds(Extent::new(0.0, 0.0, 1.0, 1.0));
        let filtered = DiffStream::new(db.clone(), before.id(), after.id(), options)
            .collect_entries()
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name(), "plain");
        assert_eq!(filtered[0].change_type(), ChangeType::Modified);
    }

    #[test]
    fn bounds_prune_fully_spatial_buckets() {
        let db = db();
        let far = Extent::point(100.0, 100.0);
        let edits = (0..64)
            .map(|i| {
                let name = format!("p{i}");
                (name.clone(), Some(feature(&name, 0).with_extent(far)))
            })
            .collect();
        let before = build(&db, Arc::new(RevTree::empty()), edits);
        let after = build(&db, before.clone(), vec![("p3".into(), Some(feature("p3", 1).with_extent(far)))]);
        let options = DiffOptions::default().bounds(Extent::new(0.0, 0.0, 1.0, 1.0));
        let counts = count_changes(&db, before.id(), after.id(), options)
            .unwrap()
            .completed()
            .unwrap();
        assert!(counts.is_empty());
    }

    // ---- cancellation ----

    #[test]
    fn cancelled_diff_stops_early() {
        let db = db();
        let tree = features(&db, 100);
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut stream = DiffStream::new(
            db.clone(),
            RevTree::empty_id(),
            tree.id(),
            DiffOptions::default().cancel(cancel.clone()),
        );
        assert!(stream.next().is_none());
        assert!(stream.was_cancelled());

        let outcome = DiffStream::new(
            db,
            RevTree::empty_id(),
            tree.id(),
            DiffOptions::default().cancel(cancel),
        )
        .collect_entries()
        .unwrap();
        assert!(outcome.is_cancelled());
    }

    #[test]
    fn cancelling_midway_keeps_emitted_entries_valid() {
        let db = db();
        let tree = features(&db, 100);
        let cancel = CancelToken::new();
        let mut stream = DiffStream::new(
            db.clone(),
            RevTree::empty_id(),
            tree.id(),
            DiffOptions::default().cancel(cancel.clone()),
        );
        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.change_type(), ChangeType::Added);
        cancel.cancel();
        let rest = stream.by_ref().count();
        assert!(rest < 99);
        assert!(stream.was_cancelled());
    }
}
