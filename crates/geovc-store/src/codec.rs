//! Canonical binary encoding of revision objects.
//!
//! The encoding is deterministic and platform independent: the same logical
//! object always yields the same bytes, and therefore the same [`ObjectId`].
//! Decoding is the exact inverse and rejects anything `encode` would never
//! produce (truncation, trailing bytes, overlong varints, unsorted names).
//!
//! Layout, after a two-byte header of format version and kind tag:
//!
//! ```text
//! commit   tree_id n_parents parent_id* author committer message
//! person   name email timestamp(svarint) tz_offset(svarint)
//! tree     size num_trees layout(u8)
//!            0: n_nodes node*
//!            1: bits(u8) n_entries n_buckets (index bucket_id flags [extent])*
//! node     name kind(u8) object_id flags(u8) [metadata_id] [extent]
//! extent   min_x min_y max_x max_y (svarint, fixed precision)
//! feature  n_values (tag(u8) payload)*
//! ftype    name n_props (name type(u8) nullable(u8))*
//! tag      commit_id name message tagger
//! ```
//!
//! Unsigned integers are LEB128 varints, signed integers are zig-zag
//! varints, strings and byte arrays are length-prefixed.

use std::collections::BTreeMap;
use std::sync::Arc;

use geovc_crypto::ContentHasher;
use geovc_types::{ObjectId, ObjectKind};

use crate::error::{StoreError, StoreResult};
use crate::object::{
    Commit, Feature, FeatureType, Person, PropertyDescriptor, PropertyType, RevObject, Tag, Value,
};
use crate::tree::{Bucket, Extent, Node, NodeKind, RevTree, TreeLayout};

/// Current encoding format version.
pub const FORMAT_VERSION: u8 = 1;

const LAYOUT_LEAF: u8 = 0;
const LAYOUT_BUCKETS: u8 = 1;

const FLAG_METADATA: u8 = 0b01;
const FLAG_EXTENT: u8 = 0b10;

/// Encode any revision object.
pub fn encode(object: &RevObject) -> Vec<u8> {
    match object {
        RevObject::Commit(c) => encode_commit(c),
        RevObject::Tree(t) => encode_tree(t),
        RevObject::Feature(f) => encode_feature(f),
        RevObject::FeatureType(t) => encode_feature_type(t),
        RevObject::Tag(t) => encode_tag(t),
    }
}

/// Id of an encoding of the given kind.
pub fn object_id(kind: ObjectKind, bytes: &[u8]) -> ObjectId {
    ContentHasher::for_kind(kind).hash(bytes)
}

/// Decode any revision object.
pub fn decode(bytes: &[u8]) -> StoreResult<RevObject> {
    let kind = peek_kind(bytes)?;
    let mut r = Reader::new(&bytes[2..]);
    let object = match kind {
        ObjectKind::Commit => RevObject::Commit(Arc::new(read_commit(&mut r)?)),
        ObjectKind::Tree => {
            let id = object_id(ObjectKind::Tree, bytes);
            RevObject::Tree(Arc::new(read_tree(&mut r, id)?))
        }
        ObjectKind::Feature => RevObject::Feature(Arc::new(read_feature(&mut r)?)),
        ObjectKind::FeatureType => RevObject::FeatureType(Arc::new(read_feature_type(&mut r)?)),
        ObjectKind::Tag => RevObject::Tag(Arc::new(read_tag(&mut r)?)),
    };
    r.finish()?;
    Ok(object)
}

/// Decode, failing if the bytes hold a different kind of object.
pub fn decode_kind(bytes: &[u8], expected: ObjectKind) -> StoreResult<RevObject> {
    let actual = peek_kind(bytes)?;
    if actual != expected {
        return Err(StoreError::CorruptEncoding(format!(
            "expected {expected} object, found {actual}"
        )));
    }
    decode(bytes)
}

/// Decode and check that the bytes hash to `id`.
pub fn decode_verified(id: &ObjectId, bytes: &[u8]) -> StoreResult<RevObject> {
    let kind = peek_kind(bytes)?;
    let computed = object_id(kind, bytes);
    if computed != *id {
        return Err(StoreError::HashMismatch {
            expected: *id,
            computed,
        });
    }
    decode(bytes)
}

/// Read only the header.
pub fn peek_kind(bytes: &[u8]) -> StoreResult<ObjectKind> {
    let (&version, rest) = bytes
        .split_first()
        .ok_or_else(|| StoreError::CorruptEncoding("empty input".into()))?;
    if version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedFormat(format!(
            "format version {version}, expected {FORMAT_VERSION}"
        )));
    }
    let &tag = rest
        .first()
        .ok_or_else(|| StoreError::CorruptEncoding("missing kind tag".into()))?;
    ObjectKind::from_tag(tag).map_err(|e| StoreError::CorruptEncoding(e.to_string()))
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new(kind: ObjectKind) -> Self {
        Self {
            buf: vec![FORMAT_VERSION, kind.tag()],
        }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn varint(&mut self, mut value: u64) {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value > 0 {
                byte |= 0x80;
            }
            self.buf.push(byte);
            if value == 0 {
                break;
            }
        }
    }

    fn svarint(&mut self, value: i64) {
        self.varint(((value << 1) ^ (value >> 63)) as u64);
    }

    fn len(&mut self, n: usize) {
        self.varint(n as u64);
    }

    fn id(&mut self, id: &ObjectId) {
        self.buf.extend_from_slice(id.as_bytes());
    }

    fn bytes(&mut self, data: &[u8]) {
        self.len(data.len());
        self.buf.extend_from_slice(data);
    }

    fn str(&mut self, s: &str) {
        self.bytes(s.as_bytes());
    }

    fn person(&mut self, p: &Person) {
        self.str(&p.name);
        self.str(&p.email);
        self.svarint(p.timestamp);
        self.svarint(p.tz_offset as i64);
    }

    fn extent(&mut self, e: &Extent) {
        for v in e.fixed() {
            self.svarint(v);
        }
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

fn encode_commit(c: &Commit) -> Vec<u8> {
    let mut w = Writer::new(ObjectKind::Commit);
    w.id(&c.tree);
    w.len(c.parents.len());
    for p in &c.parents {
        w.id(p);
    }
    w.person(&c.author);
    w.person(&c.committer);
    w.str(&c.message);
    w.finish()
}

pub(crate) fn encode_tree(t: &RevTree) -> Vec<u8> {
    let mut w = Writer::new(ObjectKind::Tree);
    w.varint(t.size());
    w.varint(t.num_trees());
    match t.layout() {
        TreeLayout::Leaf(nodes) => {
            w.u8(LAYOUT_LEAF);
            w.len(nodes.len());
            for node in nodes {
                w.str(node.name());
                w.u8(node.kind().tag());
                w.id(&node.object_id());
                let mut flags = 0;
                if node.metadata_id().is_some() {
                    flags |= FLAG_METADATA;
                }
                if node.extent().is_some() {
                    flags |= FLAG_EXTENT;
                }
                w.u8(flags);
                if let Some(m) = node.metadata_id() {
                    w.id(&m);
                }
                if let Some(e) = node.extent() {
                    w.extent(&e);
                }
            }
        }
        TreeLayout::Buckets { bits, buckets } => {
            w.u8(LAYOUT_BUCKETS);
            w.u8(*bits);
            w.varint(t.entry_count());
            w.len(buckets.len());
            for (index, bucket) in buckets {
                w.varint(*index as u64);
                w.id(&bucket.tree_id);
                match &bucket.extent {
                    Some(e) => {
                        w.u8(FLAG_EXTENT);
                        w.extent(e);
                    }
                    None => w.u8(0),
                }
            }
        }
    }
    w.finish()
}

fn encode_feature(f: &Feature) -> Vec<u8> {
    let mut w = Writer::new(ObjectKind::Feature);
    w.len(f.values.len());
    for v in &f.values {
        w.u8(v.tag());
        match v {
            Value::Null => {}
            Value::Bool(b) => w.u8(*b as u8),
            Value::Int(i) => w.svarint(*i),
            Value::Float(x) => w.buf.extend_from_slice(&x.to_bits().to_be_bytes()),
            Value::String(s) => w.str(s),
            Value::Bytes(b) => w.bytes(b),
        }
    }
    w.finish()
}

fn encode_feature_type(t: &FeatureType) -> Vec<u8> {
    let mut w = Writer::new(ObjectKind::FeatureType);
    w.str(&t.name);
    w.len(t.properties.len());
    for p in &t.properties {
        w.str(&p.name);
        w.u8(p.property_type.tag());
        w.u8(p.nullable as u8);
    }
    w.finish()
}

fn encode_tag(t: &Tag) -> Vec<u8> {
    let mut w = Writer::new(ObjectKind::Tag);
    w.id(&t.commit);
    w.str(&t.name);
    w.str(&t.message);
    w.person(&t.tagger);
    w.finish()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn corrupt(reason: impl Into<String>) -> StoreError {
    StoreError::CorruptEncoding(reason.into())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> StoreResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(corrupt(format!(
                "truncated: need {n} bytes at offset {}, have {}",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> StoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn varint(&mut self) -> StoreResult<u64> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.u8()?;
            if shift == 63 && byte > 1 {
                return Err(corrupt("varint overflow"));
            }
            value |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                if byte == 0 && shift > 0 {
                    return Err(corrupt("non-canonical varint"));
                }
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(corrupt("varint overflow"));
            }
        }
    }

    fn svarint(&mut self) -> StoreResult<i64> {
        let u = self.varint()?;
        Ok(((u >> 1) as i64) ^ -((u & 1) as i64))
    }

    /// A length or count; bounded by the bytes left so corrupt input cannot
    /// request huge allocations.
    fn len(&mut self) -> StoreResult<usize> {
        let n = self.varint()?;
        usize::try_from(n)
            .ok()
            .filter(|n| *n <= self.remaining())
            .ok_or_else(|| corrupt(format!("length {n} exceeds remaining input")))
    }

    fn id(&mut self) -> StoreResult<ObjectId> {
        let bytes = self.take(ObjectId::LEN)?;
        ObjectId::try_from(bytes).map_err(|e| corrupt(e.to_string()))
    }

    fn bytes(&mut self) -> StoreResult<Vec<u8>> {
        let n = self.len()?;
        Ok(self.take(n)?.to_vec())
    }

    fn string(&mut self) -> StoreResult<String> {
        String::from_utf8(self.bytes()?).map_err(|e| corrupt(format!("invalid utf-8: {e}")))
    }

    fn bool(&mut self) -> StoreResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(corrupt(format!("invalid bool byte {other}"))),
        }
    }

    fn person(&mut self) -> StoreResult<Person> {
        let name = self.string()?;
        let email = self.string()?;
        let timestamp = self.svarint()?;
        let tz_offset = i32::try_from(self.svarint()?)
            .map_err(|_| corrupt("timezone offset out of range"))?;
        Ok(Person {
            name,
            email,
            timestamp,
            tz_offset,
        })
    }

    fn extent(&mut self) -> StoreResult<Extent> {
        let min_x = self.svarint()?;
        let min_y = self.svarint()?;
        let max_x = self.svarint()?;
        let max_y = self.svarint()?;
        Extent::from_fixed(min_x, min_y, max_x, max_y)
            .ok_or_else(|| corrupt("extent minimum exceeds maximum"))
    }

    fn finish(&self) -> StoreResult<()> {
        if self.remaining() != 0 {
            return Err(corrupt(format!("{} trailing bytes", self.remaining())));
        }
        Ok(())
    }
}

fn read_commit(r: &mut Reader<'_>) -> StoreResult<Commit> {
    let tree = r.id()?;
    let n = r.len()?;
    let mut parents = Vec::with_capacity(n);
    for _ in 0..n {
        parents.push(r.id()?);
    }
    let author = r.person()?;
    let committer = r.person()?;
    let message = r.string()?;
    Ok(Commit {
        tree,
        parents,
        author,
        committer,
        message,
    })
}

fn read_tree(r: &mut Reader<'_>, id: ObjectId) -> StoreResult<RevTree> {
    let size = r.varint()?;
    let num_trees = r.varint()?;
    let entries;
    let layout = match r.u8()? {
        LAYOUT_LEAF => {
            let n = r.len()?;
            let mut nodes: Vec<Node> = Vec::with_capacity(n);
            for _ in 0..n {
                let node = read_node(r)?;
                if let Some(prev) = nodes.last() {
                    if prev.name() >= node.name() {
                        return Err(corrupt(format!(
                            "leaf names not strictly increasing at {:?}",
                            node.name()
                        )));
                    }
                }
                nodes.push(node);
            }
            let trees = nodes.iter().filter(|n| n.is_tree()).count() as u64;
            let features = nodes.len() as u64 - trees;
            // Nested trees only ever add to the totals.
            let consistent = if trees == 0 {
                num_trees == 0 && size == features
            } else {
                num_trees >= trees && size >= features
            };
            if !consistent {
                return Err(corrupt(format!(
                    "leaf counts ({size}, {num_trees}) do not match entries ({features}, {trees})"
                )));
            }
            entries = nodes.len() as u64;
            TreeLayout::Leaf(nodes)
        }
        LAYOUT_BUCKETS => {
            let bits = r.u8()?;
            if !(1..=8).contains(&bits) {
                return Err(StoreError::UnsupportedFormat(format!(
                    "bucket width of {bits} bits"
                )));
            }
            entries = r.varint()?;
            if entries > size.saturating_add(num_trees) {
                return Err(corrupt(format!(
                    "{entries} entries exceed totals ({size}, {num_trees})"
                )));
            }
            let n = r.len()?;
            let mut buckets = BTreeMap::new();
            let mut last: Option<u32> = None;
            for _ in 0..n {
                let index = u32::try_from(r.varint()?)
                    .ok()
                    .filter(|i| *i < (1u32 << bits))
                    .ok_or_else(|| corrupt("bucket index out of range"))?;
                if last.is_some_and(|l| l >= index) {
                    return Err(corrupt("bucket indexes not strictly increasing"));
                }
                last = Some(index);
                let tree_id = r.id()?;
                let extent = match r.u8()? {
                    0 => None,
                    FLAG_EXTENT => Some(r.extent()?),
                    other => return Err(corrupt(format!("invalid bucket flags {other:#04x}"))),
                };
                buckets.insert(index, Bucket { tree_id, extent });
            }
            TreeLayout::Buckets { bits, buckets }
        }
        other => return Err(corrupt(format!("unknown tree layout {other}"))),
    };
    Ok(RevTree::from_parts(id, size, num_trees, entries, layout))
}

fn read_node(r: &mut Reader<'_>) -> StoreResult<Node> {
    let name = r.string()?;
    let kind_tag = r.u8()?;
    let kind =
        NodeKind::from_tag(kind_tag).ok_or_else(|| corrupt(format!("unknown node kind {kind_tag}")))?;
    let object_id = r.id()?;
    let flags = r.u8()?;
    if flags & !(FLAG_METADATA | FLAG_EXTENT) != 0 {
        return Err(corrupt(format!("invalid node flags {flags:#04x}")));
    }
    let mut node = Node::new(name, object_id, kind);
    if flags & FLAG_METADATA != 0 {
        node = node.with_metadata(r.id()?);
    }
    if flags & FLAG_EXTENT != 0 {
        node = node.with_extent(r.extent()?);
    }
    Ok(node)
}

fn read_feature(r: &mut Reader<'_>) -> StoreResult<Feature> {
    let n = r.len()?;
    let mut values = Vec::with_capacity(n);
    for _ in 0..n {
        let value = match r.u8()? {
            0 => Value::Null,
            1 => Value::Bool(r.bool()?),
            2 => Value::Int(r.svarint()?),
            3 => {
                let raw: [u8; 8] = r
                    .take(8)?
                    .try_into()
                    .map_err(|_| corrupt("truncated float"))?;
                Value::Float(f64::from_bits(u64::from_be_bytes(raw)))
            }
            4 => Value::String(r.string()?),
            5 => Value::Bytes(r.bytes()?),
            other => return Err(corrupt(format!("unknown value tag {other}"))),
        };
        values.push(value);
    }
    Ok(Feature { values })
}

fn read_feature_type(r: &mut Reader<'_>) -> StoreResult<FeatureType> {
    let name = r.string()?;
    let n = r.len()?;
    let mut properties = Vec::with_capacity(n);
    for _ in 0..n {
        let prop_name = r.string()?;
        let tag = r.u8()?;
        let property_type = PropertyType::from_tag(tag)
            .ok_or_else(|| corrupt(format!("unknown property type {tag}")))?;
        let nullable = r.bool()?;
        properties.push(PropertyDescriptor {
            name: prop_name,
            property_type,
            nullable,
        });
    }
    Ok(FeatureType { name, properties })
}

fn read_tag(r: &mut Reader<'_>) -> StoreResult<Tag> {
    let commit = r.id()?;
    let name = r.string()?;
    let message = r.string()?;
    let tagger = r.person()?;
    Ok(Tag {
        name,
        commit,
        message,
        tagger,
    })
}
