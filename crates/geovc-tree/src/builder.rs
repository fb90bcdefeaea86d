use std::collections::BTreeMap;
use std::sync::Arc;

use geovc_cache::ObjectDatabase;
use geovc_store::{Bucket, Node, RevTree, TreeLayout};
use geovc_types::{CancelToken, Outcome};
use tracing::debug;

use crate::config::TreeConfig;
use crate::error::{TreeError, TreeResult};
use crate::lookup::collect_nodes;

/// Unwrap a completed step or propagate cancellation.
macro_rules! completed {
    ($step:expr) => {
        match $step? {
            Outcome::Completed(value) => value,
            Outcome::Cancelled => return Ok(Outcome::Cancelled),
        }
    };
}

/// A pending change to one name. `None` removes the entry.
type Edit<'a> = (&'a str, Option<&'a Node>);

/// Produces new trees from a base tree plus a batch of edits.
///
/// Edits are buffered by name (the last edit to a name wins) and applied by
/// [`build`](RevTreeBuilder::build). Subtrees no edit touches are reused by
/// id, so a build writes only the trees on the paths to changed entries.
///
/// A builder is meant for one writer; share the resulting tree, not the
/// builder.
pub struct RevTreeBuilder {
    db: ObjectDatabase,
    config: TreeConfig,
    base: Arc<RevTree>,
    edits: BTreeMap<String, Option<Node>>,
}

impl RevTreeBuilder {
    /// A builder starting from the empty tree.
    pub fn new(db: ObjectDatabase, config: TreeConfig) -> TreeResult<Self> {
        config.validate()?;
        Ok(Self {
            db,
            config,
            base: Arc::new(RevTree::empty()),
            edits: BTreeMap::new(),
        })
    }

    /// A builder starting from `base`.
    pub fn from_base(db: ObjectDatabase, config: TreeConfig, base: Arc<RevTree>) -> TreeResult<Self> {
        config.validate()?;
        check_bits(&config, &base)?;
        Ok(Self {
            db,
            config,
            base,
            edits: BTreeMap::new(),
        })
    }

    pub fn base(&self) -> &Arc<RevTree> {
        &self.base
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Number of names with a buffered edit.
    pub fn pending(&self) -> usize {
        self.edits.len()
    }

    /// Insert or replace the entry named `node.name()`, whatever its kind.
    ///
    /// The tree a TREE node points at must be readable when the builder
    /// runs, since its totals are folded into the new tree's.
    pub fn put(&mut self, node: Node) -> TreeResult<&mut Self> {
        validate_name(node.name())?;
        self.edits.insert(node.name().to_owned(), Some(node));
        Ok(self)
    }

    /// Remove the entry called `name`. Removing an absent name is a no-op.
    pub fn remove(&mut self, name: &str) -> &mut Self {
        self.edits.insert(name.to_owned(), None);
        self
    }

    /// Apply all buffered edits and write the resulting trees.
    ///
    /// On completion the builder's base becomes the new tree and the edit
    /// buffer is cleared. On cancellation the base and edits are left as
    /// they were; trees already written are unreferenced but harmless.
    pub fn build(&mut self, cancel: &CancelToken) -> TreeResult<Outcome<Arc<RevTree>>> {
        let edits: Vec<Edit<'_>> = self
            .edits
            .iter()
            .map(|(name, node)| (name.as_str(), node.as_ref()))
            .collect();
        let pass = Pass {
            db: &self.db,
            config: &self.config,
            cancel,
        };
        let root = match pass.apply(&self.base, edits, 0)? {
            Outcome::Completed(root) => root,
            Outcome::Cancelled => {
                debug!(pending = self.edits.len(), "tree build cancelled");
                return Ok(Outcome::Cancelled);
            }
        };
        // Persist the root even when unchanged, so the result is always
        // readable from the store.
        self.db.put(Arc::clone(&root))?;
        debug!(
            tree = %root.id().short_hex(),
            edits = self.edits.len(),
            size = root.size(),
            num_trees = root.num_trees(),
            leaf = root.is_leaf(),
            "built tree"
        );
        self.edits.clear();
        self.base = Arc::clone(&root);
        Ok(Outcome::Completed(root))
    }
}

impl std::fmt::Debug for RevTreeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevTreeBuilder")
            .field("base", &self.base.id())
            .field("config", &self.config)
            .field("pending", &self.edits.len())
            .finish()
    }
}

fn validate_name(name: &str) -> TreeResult<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.contains('/') {
        "name contains '/'"
    } else if name.chars().any(char::is_control) {
        "name contains control characters"
    } else {
        return Ok(());
    };
    Err(TreeError::InvalidNodeName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    })
}

fn check_bits(config: &TreeConfig, tree: &RevTree) -> TreeResult<()> {
    match tree.bucket_bits() {
        Some(bits) if bits != config.bucket_bits => Err(TreeError::UnsupportedFormat(format!(
            "tree {} uses {bits}-bit buckets, configured for {}",
            tree.id().short_hex(),
            config.bucket_bits
        ))),
        _ => Ok(()),
    }
}

/// One build: borrowed context shared by the recursive steps.
struct Pass<'a> {
    db: &'a ObjectDatabase,
    config: &'a TreeConfig,
    cancel: &'a CancelToken,
}

impl Pass<'_> {
    /// Apply `edits` (sorted by name) to `tree`, which sits at `depth`.
    fn apply(
        &self,
        tree: &Arc<RevTree>,
        edits: Vec<Edit<'_>>,
        depth: u32,
    ) -> TreeResult<Outcome<Arc<RevTree>>> {
        if self.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        if edits.is_empty() {
            return Ok(Outcome::Completed(Arc::clone(tree)));
        }
        check_bits(self.config, tree)?;

        match tree.layout() {
            TreeLayout::Leaf(nodes) => {
                let mut merged: BTreeMap<&str, &Node> =
                    nodes.iter().map(|n| (n.name(), n)).collect();
                for (name, edit) in edits {
                    match edit {
                        Some(node) => merged.insert(name, node),
                        None => merged.remove(name),
                    };
                }
                let nodes: Vec<Node> = merged.into_values().cloned().collect();
                self.canonical(nodes, depth)
            }
            TreeLayout::Buckets { bits, buckets } => {
                let mut routed: BTreeMap<u32, Vec<Edit<'_>>> = BTreeMap::new();
                for edit in edits {
                    let index = self.config.bucket_of(edit.0, depth).ok_or_else(|| {
                        TreeError::UnsupportedFormat(format!(
                            "bucket tree {} at maximum depth {depth}",
                            tree.id().short_hex()
                        ))
                    })?;
                    routed.entry(index).or_default().push(edit);
                }

                let mut slots = buckets.clone();
                let mut entries = tree.entry_count();
                let mut size = tree.size();
                let mut num_trees = tree.num_trees();
                for (index, sub_edits) in routed {
                    let child = match buckets.get(&index) {
                        Some(bucket) => self.db.get_tree(&bucket.tree_id)?,
                        None => Arc::new(RevTree::empty()),
                    };
                    let updated = completed!(self.apply(&child, sub_edits, depth + 1));
                    entries = entries + updated.entry_count() - child.entry_count();
                    size = size + updated.size() - child.size();
                    num_trees = num_trees + updated.num_trees() - child.num_trees();
                    if updated.is_empty() {
                        slots.remove(&index);
                    } else {
                        slots.insert(index, Bucket::new(updated.id(), updated.extent()));
                    }
                }

                if (entries as usize) < self.config.split_threshold {
                    // Fell below the threshold: collapse into a single leaf.
                    let collapsed = RevTree::buckets(*bits, slots, entries, size, num_trees);
                    let nodes = collect_nodes(self.db, Arc::new(collapsed))?;
                    return self.write(RevTree::leaf_with_totals(nodes, size, num_trees));
                }
                self.write(RevTree::buckets(*bits, slots, entries, size, num_trees))
            }
        }
    }

    /// The canonical tree for `nodes` (sorted, unique names) at `depth`.
    fn canonical(&self, nodes: Vec<Node>, depth: u32) -> TreeResult<Outcome<Arc<RevTree>>> {
        if self.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        if nodes.len() < self.config.split_threshold || depth >= self.config.max_depth() {
            let (size, num_trees) = self.totals(&nodes)?;
            return self.write(RevTree::leaf_with_totals(nodes, size, num_trees));
        }

        let entries = nodes.len() as u64;
        let mut groups: BTreeMap<u32, Vec<Node>> = BTreeMap::new();
        for node in nodes {
            let index = self.config.bucket_of(node.name(), depth).ok_or_else(|| {
                TreeError::InvalidConfig(format!("no bucket bits left at depth {depth}"))
            })?;
            groups.entry(index).or_default().push(node);
        }

        let mut slots = BTreeMap::new();
        let (mut size, mut num_trees) = (0, 0);
        for (index, group) in groups {
            let child = completed!(self.canonical(group, depth + 1));
            size += child.size();
            num_trees += child.num_trees();
            slots.insert(index, Bucket::new(child.id(), child.extent()));
        }
        self.write(RevTree::buckets(
            self.config.bucket_bits,
            slots,
            entries,
            size,
            num_trees,
        ))
    }

    /// Recursive `(size, num_trees)` of a set of direct entries. Each TREE
    /// node contributes itself plus the totals its target tree records.
    fn totals(&self, nodes: &[Node]) -> TreeResult<(u64, u64)> {
        let (mut size, mut num_trees) = (0, 0);
        for node in nodes {
            if node.is_tree() {
                let child = self.db.get_tree(&node.object_id())?;
                size += child.size();
                num_trees += 1 + child.num_trees();
            } else {
                size += 1;
            }
        }
        Ok((size, num_trees))
    }

    fn write(&self, tree: RevTree) -> TreeResult<Outcome<Arc<RevTree>>> {
        Ok(Outcome::Completed(self.db.put_tree(tree)?))
    }
}
