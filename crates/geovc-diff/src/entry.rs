use geovc_store::Node;

/// The kind of a [`DiffEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

/// A single change between two trees.
///
/// `path` is the slash-separated path of the tree holding the entry, empty
/// for entries of the top-level trees being compared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffEntry {
    /// The entry exists only on the right.
    Added { path: String, node: Node },
    /// The entry exists only on the left.
    Removed { path: String, node: Node },
    /// The entry exists on both sides with different content.
    Modified { path: String, old: Node, new: Node },
}

impl DiffEntry {
    pub fn change_type(&self) -> ChangeType {
        match self {
            DiffEntry::Added { .. } => ChangeType::Added,
            DiffEntry::Removed { .. } => ChangeType::Removed,
            DiffEntry::Modified { .. } => ChangeType::Modified,
        }
    }

    /// Path of the containing tree.
    pub fn path(&self) -> &str {
        match self {
            DiffEntry::Added { path, .. }
            | DiffEntry::Removed { path, .. }
            | DiffEntry::Modified { path, .. } => path,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DiffEntry::Added { node, .. } | DiffEntry::Removed { node, .. } => node.name(),
            DiffEntry::Modified { new, .. } => new.name(),
        }
    }

    /// Path of the entry itself.
    pub fn full_path(&self) -> String {
        join_path(self.path(), self.name())
    }

    /// The left-hand node, if any.
    pub fn old(&self) -> Option<&Node> {
        match self {
            DiffEntry::Removed { node, .. } => Some(node),
            DiffEntry::Modified { old, .. } => Some(old),
            DiffEntry::Added { .. } => None,
        }
    }

    /// The right-hand node, if any.
    pub fn new(&self) -> Option<&Node> {
        match self {
            DiffEntry::Added { node, .. } => Some(node),
            DiffEntry::Modified { new, .. } => Some(new),
            DiffEntry::Removed { .. } => None,
        }
    }

    /// The same change seen from the other side.
    pub fn invert(self) -> DiffEntry {
        match self {
            DiffEntry::Added { path, node } => DiffEntry::Removed { path, node },
            DiffEntry::Removed { path, node } => DiffEntry::Added { path, node },
            DiffEntry::Modified { path, old, new } => DiffEntry::Modified {
                path,
                old: new,
                new: old,
            },
        }
    }
}

/// Totals per change type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffCounts {
    pub added: u64,
    pub removed: u64,
    pub modified: u64,
}

impl DiffCounts {
    pub fn record(&mut self, entry: &DiffEntry) {
        match entry.change_type() {
            ChangeType::Added => self.added += 1,
            ChangeType::Removed => self.removed += 1,
            ChangeType::Modified => self.modified += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.added + self.removed + self.modified
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{parent}/{name}")
    }
}
