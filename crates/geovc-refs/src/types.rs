//! Core reference types.

use std::fmt;

use geovc_types::ObjectId;
use serde::{Deserialize, Serialize};

use crate::names::{HEADS_PREFIX, REMOTES_PREFIX, TAGS_PREFIX};

/// What a ref points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefValue {
    /// An object id, usually a commit.
    Direct(ObjectId),
    /// The name of another ref.
    Symbolic(String),
}

impl RefValue {
    pub fn as_direct(&self) -> Option<ObjectId> {
        match self {
            RefValue::Direct(id) => Some(*id),
            RefValue::Symbolic(_) => None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            RefValue::Symbolic(target) => Some(target),
            RefValue::Direct(_) => None,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, RefValue::Symbolic(_))
    }
}

impl From<ObjectId> for RefValue {
    fn from(id: ObjectId) -> Self {
        RefValue::Direct(id)
    }
}

impl fmt::Display for RefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefValue::Direct(id) => write!(f, "{id}"),
            RefValue::Symbolic(target) => write!(f, "ref: {target}"),
        }
    }
}

/// A named ref and its value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    pub name: String,
    pub value: RefValue,
}

impl Ref {
    pub fn new(name: impl Into<String>, value: RefValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn direct(name: impl Into<String>, id: ObjectId) -> Self {
        Self::new(name, RefValue::Direct(id))
    }

    pub fn symbolic(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RefValue::Symbolic(target.into()))
    }

    /// The name without its well-known prefix (`main` for `refs/heads/main`).
    pub fn short_name(&self) -> &str {
        crate::names::short_name(&self.name)
    }

    pub fn is_branch(&self) -> bool {
        self.name.starts_with(HEADS_PREFIX)
    }

    pub fn is_tag(&self) -> bool {
        self.name.starts_with(TAGS_PREFIX)
    }

    pub fn is_remote(&self) -> bool {
        self.name.starts_with(REMOTES_PREFIX)
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.name, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let id = ObjectId::from_bytes(b"c");
        assert!(Ref::direct("refs/heads/main", id).is_branch());
        assert!(Ref::direct("refs/tags/v1", id).is_tag());
        assert!(Ref::direct("refs/remotes/origin/main", id).is_remote());
        let head = Ref::symbolic("HEAD", "refs/heads/main");
        assert!(!head.is_branch());
        assert_eq!(head.value.target(), Some("refs/heads/main"));
        assert_eq!(head.value.as_direct(), None);
        assert_eq!(head.to_string(), "HEAD -> ref: refs/heads/main");
    }

    #[test]
    fn serde_roundtrip() {
        let r = Ref::direct("refs/heads/main", ObjectId::from_bytes(b"c"));
        let json = serde_json::to_string(&r).unwrap();
        let back: Ref = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }
}
