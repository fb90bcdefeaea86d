use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The kind of a revision object.
///
/// The numeric tag is part of the canonical encoding header and must never be
/// renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Commit,
    Tree,
    Feature,
    FeatureType,
    Tag,
}

impl ObjectKind {
    /// All kinds in tag order.
    pub const ALL: [ObjectKind; 5] = [
        ObjectKind::Commit,
        ObjectKind::Tree,
        ObjectKind::Feature,
        ObjectKind::FeatureType,
        ObjectKind::Tag,
    ];

    /// Encoding tag for this kind.
    pub const fn tag(self) -> u8 {
        match self {
            ObjectKind::Commit => 1,
            ObjectKind::Tree => 2,
            ObjectKind::Feature => 3,
            ObjectKind::FeatureType => 4,
            ObjectKind::Tag => 5,
        }
    }

    /// Inverse of [`ObjectKind::tag`].
    pub fn from_tag(tag: u8) -> Result<Self, TypeError> {
        Self::ALL
            .into_iter()
            .find(|k| k.tag() == tag)
            .ok_or(TypeError::UnknownKind(tag))
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Feature => "feature",
            ObjectKind::FeatureType => "featuretype",
            ObjectKind::Tag => "tag",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
