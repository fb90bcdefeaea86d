use std::sync::Arc;

use geovc_types::{ObjectId, ObjectKind};

use crate::codec;
use crate::tree::RevTree;

/// Author, committer or tagger of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Person {
    pub name: String,
    pub email: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Offset from UTC in minutes.
    pub tz_offset: i32,
}

impl Person {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        timestamp: i64,
        tz_offset: i32,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            timestamp,
            tz_offset,
        }
    }

    /// A person stamped with the current UTC time.
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self::new(name, email, chrono::Utc::now().timestamp_millis(), 0)
    }
}

/// A snapshot of a root tree with its history links.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Commit {
    pub tree: ObjectId,
    /// Parent order is significant: the first parent is the mainline.
    pub parents: Vec<ObjectId>,
    pub author: Person,
    pub committer: Person,
    pub message: String,
}

impl Commit {
    pub fn new(
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: Person,
        committer: Person,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tree,
            parents,
            author,
            committer,
            message: message.into(),
        }
    }

    pub fn first_parent(&self) -> Option<ObjectId> {
        self.parents.first().copied()
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

/// A single feature property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Opaque bytes; geometries travel in this form.
    Bytes(Vec<u8>),
}

impl Value {
    pub(crate) const fn tag(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::String(_) => 4,
            Value::Bytes(_) => 5,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// A versioned record: an ordered list of property values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    pub values: Vec<Value>,
}

impl Feature {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }
}

/// Declared type of a feature-type property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Bool,
    Int,
    Float,
    String,
    Bytes,
    Geometry,
}

impl PropertyType {
    pub(crate) const fn tag(self) -> u8 {
        match self {
            PropertyType::Bool => 1,
            PropertyType::Int => 2,
            PropertyType::Float => 3,
            PropertyType::String => 4,
            PropertyType::Bytes => 5,
            PropertyType::Geometry => 6,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => PropertyType::Bool,
            2 => PropertyType::Int,
            3 => PropertyType::Float,
            4 => PropertyType::String,
            5 => PropertyType::Bytes,
            6 => PropertyType::Geometry,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyDescriptor {
    pub name: String,
    pub property_type: PropertyType,
    pub nullable: bool,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, property_type: PropertyType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            property_type,
            nullable,
        }
    }
}

/// Schema shared by a collection of features.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureType {
    pub name: String,
    pub properties: Vec<PropertyDescriptor>,
}

impl FeatureType {
    pub fn new(name: impl Into<String>, properties: Vec<PropertyDescriptor>) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }
}

/// An annotated tag naming a commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    pub name: String,
    pub commit: ObjectId,
    pub message: String,
    pub tagger: Person,
}

/// Any immutable revision object.
///
/// Variants are reference counted so decoded objects can be shared between
/// the cache and any number of readers.
#[derive(Debug, Clone, PartialEq)]
pub enum RevObject {
    Commit(Arc<Commit>),
    Tree(Arc<RevTree>),
    Feature(Arc<Feature>),
    FeatureType(Arc<FeatureType>),
    Tag(Arc<Tag>),
}

impl RevObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            RevObject::Commit(_) => ObjectKind::Commit,
            RevObject::Tree(_) => ObjectKind::Tree,
            RevObject::Feature(_) => ObjectKind::Feature,
            RevObject::FeatureType(_) => ObjectKind::FeatureType,
            RevObject::Tag(_) => ObjectKind::Tag,
        }
    }

    /// Content id. Trees carry theirs; other kinds are hashed on demand.
    pub fn id(&self) -> ObjectId {
        match self {
            RevObject::Tree(tree) => tree.id(),
            other => codec::object_id(other.kind(), &codec::encode(other)),
        }
    }

    /// Canonical encoding.
    pub fn encode(&self) -> Vec<u8> {
        codec::encode(self)
    }

    pub fn as_commit(&self) -> Option<&Arc<Commit>> {
        match self {
            RevObject::Commit(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Arc<RevTree>> {
        match self {
            RevObject::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_feature(&self) -> Option<&Arc<Feature>> {
        match self {
            RevObject::Feature(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_feature_type(&self) -> Option<&Arc<FeatureType>> {
        match self {
            RevObject::FeatureType(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Arc<Tag>> {
        match self {
            RevObject::Tag(t) => Some(t),
            _ => None,
        }
    }
}

impl From<Commit> for RevObject {
    fn from(v: Commit) -> Self {
        RevObject::Commit(Arc::new(v))
    }
}

impl From<RevTree> for RevObject {
    fn from(v: RevTree) -> Self {
        RevObject::Tree(Arc::new(v))
    }
}

impl From<Arc<RevTree>> for RevObject {
    fn from(v: Arc<RevTree>) -> Self {
        RevObject::Tree(v)
    }
}

impl From<Feature> for RevObject {
    fn from(v: Feature) -> Self {
        RevObject::Feature(Arc::new(v))
    }
}

impl From<FeatureType> for RevObject {
    fn from(v: FeatureType) -> Self {
        RevObject::FeatureType(Arc::new(v))
    }
}

impl From<Tag> for RevObject {
    fn from(v: Tag) -> Self {
        RevObject::Tag(Arc::new(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Person {
        Person::new("Ana", "ana@example.org", 1_700_000_000_000, -180)
    }

    #[test]
    fn commit_shape_helpers() {
        let tree = RevTree::empty().id();
        let root = Commit::new(tree, vec![], person(), person(), "root");
        assert!(root.is_root());
        assert!(!root.is_merge());
        assert_eq!(root.first_parent(), None);

        let p1 = ObjectId::from_bytes(b"p1");
        let p2 = ObjectId::from_bytes(b"p2");
        let merge = Commit::new(tree, vec![p1, p2], person(), person(), "merge");
        assert!(merge.is_merge());
        assert_eq!(merge.first_parent(), Some(p1));
    }

    #[test]
    fn parent_order_changes_identity() {
        let tree = RevTree::empty().id();
        let p1 = ObjectId::from_bytes(b"p1");
        let p2 = ObjectId::from_bytes(b"p2");
        let a: RevObject = Commit::new(tree, vec![p1, p2], person(), person(), "m").into();
        let b: RevObject = Commit::new(tree, vec![p2, p1], person(), person(), "m").into();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn kinds_and_accessors() {
        let feature: RevObject = Feature::new(vec![Value::from(1i64), Value::from("x")]).into();
        assert_eq!(feature.kind(), ObjectKind::Feature);
        assert!(feature.as_feature().is_some());
        assert!(feature.as_tree().is_none());

        let tree: RevObject = RevTree::empty().into();
        assert_eq!(tree.kind(), ObjectKind::Tree);
        assert_eq!(tree.id(), RevTree::empty().id());
    }

    #[test]
    fn same_bytes_different_kind_different_id() {
        // A feature type and a feature never collide even with similar content.
        let ft: RevObject = FeatureType::new("roads", vec![]).into();
        let f: RevObject = Feature::new(vec![Value::from("roads")]).into();
        assert_ne!(ft.id(), f.id());
    }

    #[test]
    fn person_now_is_recent() {
        let p = Person::now("a", "b");
        assert!(p.timestamp > 1_600_000_000_000);
        assert_eq!(p.tz_offset, 0);
    }
}
