//! Ref name validation following git-style conventions.
//!
//! A valid ref name:
//! - is non-empty
//! - contains no whitespace, control characters, `~`, `^`, `:`, `?`, `*`, `[` or `\`
//! - contains no `..` and no `@{`
//! - neither starts nor ends with `.` or `/`
//! - does not end with `.lock`
//! - has no empty components and no component starting with `.`

use crate::error::{RefError, RefResult};

/// The symbolic ref naming the current branch.
pub const HEAD: &str = "HEAD";
pub const HEADS_PREFIX: &str = "refs/heads/";
pub const TAGS_PREFIX: &str = "refs/tags/";
pub const REMOTES_PREFIX: &str = "refs/remotes/";
/// Namespace holding the staged state of open transactions.
pub const TRANSACTIONS_PREFIX: &str = "transactions/";

const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

/// Validate a full ref name such as `refs/heads/main` or `HEAD`.
///
/// # Examples
///
/// ```
/// use geovc_refs::names::validate_ref_name;
///
/// assert!(validate_ref_name("refs/heads/main").is_ok());
/// assert!(validate_ref_name("HEAD").is_ok());
/// assert!(validate_ref_name("refs/heads/bad..name").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> RefResult<()> {
    let invalid = |reason: String| {
        Err(RefError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("must not be empty".into());
    }
    if let Some(ch) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return invalid(format!("contains forbidden character {ch:?}"));
    }
    if name.contains("..") {
        return invalid("must not contain '..'".into());
    }
    if name.contains("@{") {
        return invalid("must not contain '@{'".into());
    }
    if name.starts_with('.') || name.ends_with('.') {
        return invalid("must not start or end with '.'".into());
    }
    if name.starts_with('/') || name.ends_with('/') {
        return invalid("must not start or end with '/'".into());
    }
    if name.ends_with(".lock") {
        return invalid("must not end with '.lock'".into());
    }
    for component in name.split('/') {
        if component.is_empty() {
            return invalid("path components must not be empty".into());
        }
        if component.starts_with('.') {
            return invalid(format!("component must not start with '.': {component:?}"));
        }
    }
    Ok(())
}

/// `refs/heads/<branch>`
pub fn branch_ref(branch: &str) -> String {
    format!("{HEADS_PREFIX}{branch}")
}

/// `refs/tags/<tag>`
pub fn tag_ref(tag: &str) -> String {
    format!("{TAGS_PREFIX}{tag}")
}

/// `refs/remotes/<remote>/<branch>`
pub fn remote_ref(remote: &str, branch: &str) -> String {
    format!("{REMOTES_PREFIX}{remote}/{branch}")
}

/// Strip the well-known prefix from a ref name.
pub fn short_name(name: &str) -> &str {
    [HEADS_PREFIX, TAGS_PREFIX, REMOTES_PREFIX]
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name)
}
