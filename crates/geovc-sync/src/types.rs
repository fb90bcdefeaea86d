use geovc_types::ObjectId;

use crate::error::{SyncError, SyncResult};

/// A refspec mapping a source ref to a destination ref.
///
/// Written `[+]src[:dst]`. A leading `+` allows non-fast-forward updates.
/// Without `:dst` the destination is chosen by the operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefSpec {
    pub src: String,
    pub dst: Option<String>,
    pub force: bool,
}

impl RefSpec {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: Some(dst.into()),
            force: false,
        }
    }

    pub fn forced(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            force: true,
            ..Self::new(src, dst)
        }
    }

    /// Parse `+refs/heads/main:refs/remotes/origin/main`.
    pub fn parse(spec: &str) -> SyncResult<Self> {
        let invalid = |reason: &str| SyncError::InvalidRefSpec {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };
        let (force, rest) = match spec.strip_prefix('+') {
            Some(stripped) => (true, stripped),
            None => (false, spec),
        };
        let (src, dst) = match rest.split_once(':') {
            Some((src, dst)) => {
                if dst.is_empty() {
                    return Err(invalid("empty destination"));
                }
                (src, Some(dst.to_string()))
            }
            None => (rest, None),
        };
        if src.is_empty() {
            return Err(invalid("empty source"));
        }
        Ok(Self {
            src: src.to_string(),
            dst,
            force,
        })
    }
}

/// A ref moved by a transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefUpdate {
    pub name: String,
    pub old: Option<ObjectId>,
    pub new: Option<ObjectId>,
}

#[derive(Clone, Debug, Default)]
pub struct FetchResult {
    pub objects_received: usize,
    pub bytes_transferred: u64,
    pub refs_updated: Vec<RefUpdate>,
    /// Commits whose parents were not fetched because of the depth limit.
    pub shallow_commits: Vec<ObjectId>,
}

#[derive(Clone, Debug, Default)]
pub struct PushResult {
    pub objects_sent: usize,
    pub bytes_transferred: u64,
    pub refs_updated: Vec<RefUpdate>,
}

impl PushResult {
    pub fn is_up_to_date(&self) -> bool {
        self.refs_updated.is_empty()
    }
}
