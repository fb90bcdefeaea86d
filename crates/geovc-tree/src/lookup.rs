use std::sync::Arc;

use geovc_cache::ObjectDatabase;
use geovc_crypto::NameHash;
use geovc_store::{Node, RevTree, TreeLayout};
use geovc_types::ObjectId;

use crate::error::{TreeError, TreeResult};

/// Find a direct entry of `tree` by name, reading only the bucket chain the
/// name hashes into.
pub fn find_node(db: &ObjectDatabase, tree: &RevTree, name: &str) -> TreeResult<Option<Node>> {
    let hash = NameHash::of(name);
    let mut depth = 0;
    let mut current: Option<Arc<RevTree>> = None;
    loop {
        let tree_ref: &RevTree = current.as_deref().unwrap_or(tree);
        let next = match tree_ref.layout() {
            TreeLayout::Leaf(_) => return Ok(tree_ref.leaf_node(name).cloned()),
            TreeLayout::Buckets { bits, buckets } => {
                let index = hash.bucket(depth, *bits).ok_or_else(|| {
                    TreeError::UnsupportedFormat(format!(
                        "bucket tree {} below maximum depth {depth}",
                        tree_ref.id().short_hex()
                    ))
                })?;
                match buckets.get(&index) {
                    Some(bucket) => db.get_tree(&bucket.tree_id)?,
                    None => return Ok(None),
                }
            }
        };
        current = Some(next);
        depth += 1;
    }
}

/// Lazily yields every direct entry of a tree, descending through buckets in
/// index order. Within a leaf, nodes come in name order.
pub struct NodeIter {
    db: ObjectDatabase,
    pending: Vec<ObjectId>,
    current: Option<(Arc<RevTree>, usize)>,
}

impl NodeIter {
    pub fn new(db: ObjectDatabase, tree: Arc<RevTree>) -> Self {
        let mut iter = Self {
            db,
            pending: Vec::new(),
            current: None,
        };
        iter.enter(tree);
        iter
    }

    fn enter(&mut self, tree: Arc<RevTree>) {
        match tree.buckets_map() {
            // Reverse so the lowest index is popped first.
            Some(buckets) => self
                .pending
                .extend(buckets.values().rev().map(|b| b.tree_id)),
            None => self.current = Some((tree, 0)),
        }
    }
}

impl Iterator for NodeIter {
    type Item = TreeResult<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((tree, index)) = self.current.as_mut() {
                if let Some(node) = tree.nodes().get(*index) {
                    *index += 1;
                    return Some(Ok(node.clone()));
                }
            }
            self.current = None;
            let id = self.pending.pop()?;
            match self.db.get_tree(&id) {
                Ok(tree) => self.enter(tree),
                Err(e) => {
                    self.pending.clear();
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

/// All direct entries of a tree. Order follows [`NodeIter`].
pub fn collect_nodes(db: &ObjectDatabase, tree: Arc<RevTree>) -> TreeResult<Vec<Node>> {
    NodeIter::new(db.clone(), tree).collect()
}
