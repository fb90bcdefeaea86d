use geovc_types::{ObjectId, ObjectKind};

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"geovc-tree-v1"`) that is
/// prepended to every hash computation, so identical bytes stored as two
/// different object kinds never share an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    pub const COMMIT: Self = Self::new("geovc-commit-v1");
    pub const TREE: Self = Self::new("geovc-tree-v1");
    pub const FEATURE: Self = Self::new("geovc-feature-v1");
    pub const FEATURE_TYPE: Self = Self::new("geovc-featuretype-v1");
    pub const TAG: Self = Self::new("geovc-tag-v1");
    /// Hasher for entry names (bucket routing), never for stored objects.
    pub const NAME: Self = Self::new("geovc-name-v1");

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// The hasher for objects of the given kind.
    pub const fn for_kind(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Commit => Self::COMMIT,
            ObjectKind::Tree => Self::TREE,
            ObjectKind::Feature => Self::FEATURE,
            ObjectKind::FeatureType => Self::FEATURE_TYPE,
            ObjectKind::Tag => Self::TAG,
        }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        ObjectId::from_hash(self.digest(data))
    }

    pub(crate) fn digest(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Verify that data produces the expected object ID.
    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}
