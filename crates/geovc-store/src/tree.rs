use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use geovc_crypto::ContentHasher;
use geovc_types::ObjectId;

use crate::codec;

/// Axis-aligned bounding box stored in fixed precision.
///
/// Coordinates are kept as integers in units of `1 / PRECISION` so that an
/// extent survives encoding and decoding bit-for-bit. Conversions from
/// floating point round outward (floor for minimums, ceil for maximums).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    min_x: i64,
    min_y: i64,
    max_x: i64,
    max_y: i64,
}

impl Extent {
    pub const PRECISION: f64 = 1e7;

    /// Build an extent from floating point coordinates. Swapped bounds are
    /// reordered.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let (min_x, max_x) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let (min_y, max_y) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        Self {
            min_x: (min_x * Self::PRECISION).floor() as i64,
            min_y: (min_y * Self::PRECISION).floor() as i64,
            max_x: (max_x * Self::PRECISION).ceil() as i64,
            max_y: (max_y * Self::PRECISION).ceil() as i64,
        }
    }

    /// A degenerate extent covering a single point.
    pub fn point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// Build directly from fixed-precision coordinates.
    pub fn from_fixed(min_x: i64, min_y: i64, max_x: i64, max_y: i64) -> Option<Self> {
        (min_x <= max_x && min_y <= max_y).then_some(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Fixed-precision coordinates as `[min_x, min_y, max_x, max_y]`.
    pub fn fixed(&self) -> [i64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    pub fn min_x(&self) -> f64 {
        self.min_x as f64 / Self::PRECISION
    }

    pub fn min_y(&self) -> f64 {
        self.min_y as f64 / Self::PRECISION
    }

    pub fn max_x(&self) -> f64 {
        self.max_x as f64 / Self::PRECISION
    }

    pub fn max_y(&self) -> f64 {
        self.max_y as f64 / Self::PRECISION
    }

    /// Smallest extent covering both.
    pub fn union(&self, other: &Extent) -> Extent {
        Extent {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// True if the two extents share at least one point (edges included).
    pub fn intersects(&self, other: &Extent) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// Union of every extent yielded, or `None` if none were.
    pub fn union_all<'a>(extents: impl IntoIterator<Item = &'a Extent>) -> Option<Extent> {
        extents
            .into_iter()
            .fold(None, |acc: Option<Extent>, e| {
                Some(acc.map_or(*e, |a| a.union(e)))
            })
    }
}

impl fmt::Debug for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Extent({}, {}, {}, {})",
            self.min_x(),
            self.min_y(),
            self.max_x(),
            self.max_y()
        )
    }
}

/// What a [`Node`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Tree,
    Feature,
}

impl NodeKind {
    pub(crate) const fn tag(self) -> u8 {
        match self {
            NodeKind::Tree => 1,
            NodeKind::Feature => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(NodeKind::Tree),
            2 => Some(NodeKind::Feature),
            _ => None,
        }
    }
}

/// A named entry of a leaf tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    name: String,
    object_id: ObjectId,
    kind: NodeKind,
    metadata_id: Option<ObjectId>,
    extent: Option<Extent>,
}

impl Node {
    pub fn new(name: impl Into<String>, object_id: ObjectId, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            object_id,
            kind,
            metadata_id: None,
            extent: None,
        }
    }

    /// A node pointing at a feature object.
    pub fn feature(name: impl Into<String>, object_id: ObjectId) -> Self {
        Self::new(name, object_id, NodeKind::Feature)
    }

    /// A node pointing at a child tree.
    pub fn tree(name: impl Into<String>, object_id: ObjectId) -> Self {
        Self::new(name, object_id, NodeKind::Tree)
    }

    /// Attach a feature-type reference.
    pub fn with_metadata(mut self, metadata_id: ObjectId) -> Self {
        self.metadata_id = Some(metadata_id);
        self
    }

    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_tree(&self) -> bool {
        self.kind == NodeKind::Tree
    }

    pub fn metadata_id(&self) -> Option<ObjectId> {
        self.metadata_id
    }

    pub fn extent(&self) -> Option<Extent> {
        self.extent
    }

    /// Same name, different content. Node names are compared separately.
    pub fn content_differs(&self, other: &Node) -> bool {
        self.object_id != other.object_id
            || self.kind != other.kind
            || self.metadata_id != other.metadata_id
            || self.extent != other.extent
    }
}

/// One slot of a bucket tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bucket {
    pub tree_id: ObjectId,
    /// Extent covering everything under the child tree, or `None` if any
    /// entry there has no extent.
    pub extent: Option<Extent>,
}

impl Bucket {
    pub fn new(tree_id: ObjectId, extent: Option<Extent>) -> Self {
        Self { tree_id, extent }
    }
}

/// Physical layout of a [`RevTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeLayout {
    /// Nodes sorted by name, names unique.
    Leaf(Vec<Node>),
    /// Child trees keyed by bucket index (`< 2^bits`).
    Buckets {
        bits: u8,
        buckets: BTreeMap<u32, Bucket>,
    },
}

/// An immutable clustered tree.
///
/// The id is computed once at construction from the canonical encoding, so
/// two trees with the same logical contents always compare equal.
#[derive(Clone, PartialEq, Eq)]
pub struct RevTree {
    id: ObjectId,
    size: u64,
    num_trees: u64,
    entries: u64,
    layout: TreeLayout,
}

impl RevTree {
    /// The tree with no entries.
    pub fn empty() -> Self {
        Self::leaf(Vec::new())
    }

    /// Id of [`RevTree::empty`]. Readers resolve it without a store lookup.
    pub fn empty_id() -> ObjectId {
        static EMPTY: OnceLock<ObjectId> = OnceLock::new();
        *EMPTY.get_or_init(|| Self::empty().id())
    }

    /// Build a leaf tree whose totals count direct entries only, each TREE
    /// node as one tree with nothing beneath it. Nodes are sorted by name;
    /// when a name repeats the last occurrence wins.
    pub fn leaf(nodes: Vec<Node>) -> Self {
        let nodes = normalize(nodes);
        let num_trees = nodes.iter().filter(|n| n.is_tree()).count() as u64;
        let size = nodes.len() as u64 - num_trees;
        let entries = nodes.len() as u64;
        Self::with_computed_id(size, num_trees, entries, TreeLayout::Leaf(nodes))
    }

    /// Build a leaf tree with explicit totals. `size` and `num_trees` must
    /// include everything reachable through the TREE nodes.
    pub fn leaf_with_totals(nodes: Vec<Node>, size: u64, num_trees: u64) -> Self {
        let nodes = normalize(nodes);
        debug_assert!(num_trees >= nodes.iter().filter(|n| n.is_tree()).count() as u64);
        debug_assert!(size + num_trees >= nodes.len() as u64);
        let entries = nodes.len() as u64;
        Self::with_computed_id(size, num_trees, entries, TreeLayout::Leaf(nodes))
    }

    /// Build a bucket tree. `entries` is the number of direct entries held
    /// across all buckets; `size` and `num_trees` are the recursive totals.
    pub fn buckets(
        bits: u8,
        buckets: BTreeMap<u32, Bucket>,
        entries: u64,
        size: u64,
        num_trees: u64,
    ) -> Self {
        debug_assert!((1..=8).contains(&bits));
        debug_assert!(buckets.keys().all(|i| *i < (1u32 << bits)));
        debug_assert!(entries <= size + num_trees);
        Self::with_computed_id(size, num_trees, entries, TreeLayout::Buckets { bits, buckets })
    }

    fn with_computed_id(size: u64, num_trees: u64, entries: u64, layout: TreeLayout) -> Self {
        let mut tree = Self {
            id: ObjectId::null(),
            size,
            num_trees,
            entries,
            layout,
        };
        tree.id = ContentHasher::TREE.hash(&codec::encode_tree(&tree));
        tree
    }

    /// Used by the decoder, which already knows the id of the bytes it read.
    pub(crate) fn from_parts(
        id: ObjectId,
        size: u64,
        num_trees: u64,
        entries: u64,
        layout: TreeLayout,
    ) -> Self {
        Self {
            id,
            size,
            num_trees,
            entries,
            layout,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Number of features in the tree and every tree below it.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of trees below this one, at any depth.
    pub fn num_trees(&self) -> u64 {
        self.num_trees
    }

    /// Direct entries across all buckets; the quantity compared against the
    /// split threshold.
    pub fn entry_count(&self) -> u64 {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.layout, TreeLayout::Leaf(_))
    }

    pub fn layout(&self) -> &TreeLayout {
        &self.layout
    }

    /// Leaf nodes; empty for bucket trees.
    pub fn nodes(&self) -> &[Node] {
        match &self.layout {
            TreeLayout::Leaf(nodes) => nodes,
            TreeLayout::Buckets { .. } => &[],
        }
    }

    /// Bucket slots, or `None` for leaf trees.
    pub fn buckets_map(&self) -> Option<&BTreeMap<u32, Bucket>> {
        match &self.layout {
            TreeLayout::Leaf(_) => None,
            TreeLayout::Buckets { buckets, .. } => Some(buckets),
        }
    }

    pub fn bucket_bits(&self) -> Option<u8> {
        match &self.layout {
            TreeLayout::Leaf(_) => None,
            TreeLayout::Buckets { bits, .. } => Some(*bits),
        }
    }

    /// Find a node by name in a leaf tree. Bucket trees need a store lookup
    /// and always return `None` here.
    pub fn leaf_node(&self, name: &str) -> Option<&Node> {
        let nodes = self.nodes();
        nodes
            .binary_search_by(|n| n.name.as_str().cmp(name))
            .ok()
            .map(|i| &nodes[i])
    }

    /// Union extent of the direct entries or buckets. `None` when the tree
    /// is empty or any entry lacks an extent, so a known extent always
    /// bounds every entry beneath it.
    pub fn extent(&self) -> Option<Extent> {
        let extents: Option<Vec<Extent>> = match &self.layout {
            TreeLayout::Leaf(nodes) => nodes.iter().map(|n| n.extent).collect(),
            TreeLayout::Buckets { buckets, .. } => buckets.values().map(|b| b.extent).collect(),
        };
        Extent::union_all(extents?.iter())
    }
}

fn normalize(nodes: Vec<Node>) -> Vec<Node> {
    let mut by_name: BTreeMap<String, Node> = BTreeMap::new();
    for node in nodes {
        by_name.insert(node.name.clone(), node);
    }
    by_name.into_values().collect()
}

impl fmt::Debug for RevTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("RevTree");
        s.field("id", &self.id)
            .field("size", &self.size)
            .field("num_trees", &self.num_trees)
            .field("entries", &self.entries);
        match &self.layout {
            TreeLayout::Leaf(nodes) => s.field("nodes", &nodes.len()),
            TreeLayout::Buckets { bits, buckets } => {
                s.field("bits", bits).field("buckets", &buckets.len())
            }
        };
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(s: &str) -> ObjectId {
        ObjectId::from_bytes(s.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Extent
    // -----------------------------------------------------------------------

    #[test]
    fn extent_rounds_outward() {
        let e = Extent::new(0.000_000_01, 0.0, 1.000_000_01, 1.0);
        assert_eq!(e.fixed(), [0, 0, 10_000_001, 10_000_000]);
    }

    #[test]
    fn extent_reorders_swapped_bounds() {
        assert_eq!(Extent::new(5.0, 5.0, 1.0, 1.0), Extent::new(1.0, 1.0, 5.0, 5.0));
    }

    #[test]
    fn extent_union_and_intersection() {
        let a = Extent::new(0.0, 0.0, 1.0, 1.0);
        let b = Extent::new(2.0, 2.0, 3.0, 3.0);
        let c = Extent::new(1.0, 1.0, 2.0, 2.0);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&c));
        assert!(c.intersects(&b));
        let u = a.union(&b);
        assert_eq!(u, Extent::new(0.0, 0.0, 3.0, 3.0));
        assert_eq!(Extent::union_all([&a, &b, &c]), Some(u));
        assert_eq!(Extent::union_all([]), None);
    }

    #[test]
    fn extent_from_fixed_validates() {
        assert!(Extent::from_fixed(0, 0, 1, 1).is_some());
        assert!(Extent::from_fixed(2, 0, 1, 1).is_none());
    }

    // -----------------------------------------------------------------------
    // Leaf trees
    // -----------------------------------------------------------------------

    #[test]
    fn empty_tree_has_fixed_id() {
        let a = RevTree::empty();
        let b = RevTree::leaf(vec![]);
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id(), RevTree::empty_id());
        assert!(a.is_empty());
        assert!(a.is_leaf());
        assert!(!a.id().is_null());
    }

    #[test]
    fn leaf_sorts_and_counts() {
        let tree = RevTree::leaf(vec![
            Node::feature("b", oid("b")),
            Node::tree("sub", oid("sub")),
            Node::feature("a", oid("a")),
        ]);
        let names: Vec<&str> = tree.nodes().iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["a", "b", "sub"]);
        assert_eq!(tree.size(), 2);
        assert_eq!(tree.num_trees(), 1);
        assert_eq!(tree.entry_count(), 3);
    }

    #[test]
    fn totals_include_nested_trees() {
        let tree = RevTree::leaf_with_totals(
            vec![Node::feature("a", oid("a")), Node::tree("sub", oid("sub"))],
            41,
            3,
        );
        assert_eq!(tree.size(), 41);
        assert_eq!(tree.num_trees(), 3);
        assert_eq!(tree.entry_count(), 2);
        assert_ne!(tree.id(), RevTree::leaf(tree.nodes().to_vec()).id());
    }

    #[test]
    fn leaf_last_duplicate_wins() {
        let tree = RevTree::leaf(vec![
            Node::feature("a", oid("first")),
            Node::feature("a", oid("second")),
        ]);
        assert_eq!(tree.nodes().len(), 1);
        assert_eq!(tree.leaf_node("a").unwrap().object_id(), oid("second"));
    }

    #[test]
    fn id_is_independent_of_input_order() {
        let a = RevTree::leaf(vec![Node::feature("x", oid("1")), Node::feature("y", oid("2"))]);
        let b = RevTree::leaf(vec![Node::feature("y", oid("2")), Node::feature("x", oid("1"))]);
        assert_eq!(a.id(), b.id());
        assert_eq!(a, b);
    }

    #[test]
    fn leaf_node_lookup() {
        let tree = RevTree::leaf(vec![Node::feature("a", oid("a")), Node::feature("c", oid("c"))]);
        assert!(tree.leaf_node("a").is_some());
        assert!(tree.leaf_node("b").is_none());
        assert!(tree.leaf_node("c").is_some());
    }

    #[test]
    fn leaf_extent_unions_node_extents() {
        let tree = RevTree::leaf(vec![
            Node::feature("a", oid("a")).with_extent(Extent::point(0.0, 0.0)),
            Node::feature("c", oid("c")).with_extent(Extent::point(2.0, 3.0)),
        ]);
        assert_eq!(tree.extent(), Some(Extent::new(0.0, 0.0, 2.0, 3.0)));
        assert_eq!(RevTree::empty().extent(), None);
    }

    #[test]
    fn extent_is_unknown_when_any_entry_lacks_one() {
        let tree = RevTree::leaf(vec![
            Node::feature("a", oid("a")).with_extent(Extent::point(0.0, 0.0)),
            Node::feature("b", oid("b")),
        ]);
        assert_eq!(tree.extent(), None);

        let mut buckets = BTreeMap::new();
        buckets.insert(0, Bucket::new(oid("spatial"), Some(Extent::point(1.0, 1.0))));
        buckets.insert(1, Bucket::new(oid("plain"), None));
        assert_eq!(RevTree::buckets(5, buckets, 20, 20, 0).extent(), None);
    }

    #[test]
    fn metadata_changes_identity() {
        let plain = RevTree::leaf(vec![Node::feature("a", oid("a"))]);
        let typed = RevTree::leaf(vec![Node::feature("a", oid("a")).with_metadata(oid("type"))]);
        assert_ne!(plain.id(), typed.id());
    }

    // -----------------------------------------------------------------------
    // Bucket trees
    // -----------------------------------------------------------------------

    #[test]
    fn bucket_tree_accessors() {
        let mut buckets = BTreeMap::new();
        buckets.insert(3, Bucket::new(oid("child"), Some(Extent::point(1.0, 1.0))));
        let tree = RevTree::buckets(5, buckets, 9, 10, 2);
        assert!(!tree.is_leaf());
        assert_eq!(tree.bucket_bits(), Some(5));
        assert_eq!(tree.entry_count(), 9);
        assert_eq!(tree.size(), 10);
        assert!(tree.nodes().is_empty());
        assert_eq!(tree.buckets_map().unwrap().len(), 1);
        assert_eq!(tree.extent(), Some(Extent::point(1.0, 1.0)));
    }

    #[test]
    fn node_content_differs() {
        let a = Node::feature("a", oid("1"));
        assert!(!a.content_differs(&a.clone()));
        assert!(a.content_differs(&Node::feature("a", oid("2"))));
        assert!(a.content_differs(&Node::tree("a", oid("1"))));
        assert!(a.content_differs(&a.clone().with_extent(Extent::point(0.0, 0.0))));
    }
}
