//! The [`RefDatabase`] trait defining the reference backend contract.

use geovc_types::ObjectId;
use tracing::debug;

use crate::error::{RefError, RefResult};
use crate::names::validate_ref_name;
use crate::types::{Ref, RefValue};

/// Maximum number of symbolic hops followed by [`RefDatabase::resolve`].
pub const MAX_SYMBOLIC_DEPTH: usize = 8;

/// Storage backend for named references.
///
/// Implementations must be thread-safe and make [`compare_and_swap`]
/// atomic; it is the only way refs change. The namespace layout:
///
/// - `refs/heads/*` for branches
/// - `refs/tags/*` for tags
/// - `refs/remotes/{remote}/*` for remote-tracking refs
/// - `transactions/{id}/*` for staged transaction state
///
/// [`compare_and_swap`]: RefDatabase::compare_and_swap
pub trait RefDatabase: Send + Sync {
    /// Read a ref by its full name. `Ok(None)` if absent.
    fn read(&self, name: &str) -> RefResult<Option<RefValue>>;

    /// Atomically replace the value of `name` if it currently equals
    /// `expected`, where `None` means absent. `new = None` deletes.
    ///
    /// Returns `false` without changing anything when the current value does
    /// not match.
    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<&RefValue>,
        new: Option<RefValue>,
    ) -> RefResult<bool>;

    /// All refs whose name starts with `prefix`, sorted by name.
    fn list(&self, prefix: &str) -> RefResult<Vec<Ref>>;

    /// Remove every ref whose name starts with `prefix`, returning them.
    fn remove_all(&self, prefix: &str) -> RefResult<Vec<Ref>>;

    /// Follow symbolic refs from `name` to an object id.
    fn resolve(&self, name: &str) -> RefResult<ObjectId> {
        self.resolve_if_present(name)?.ok_or_else(|| RefError::NotFound {
            name: name.to_string(),
        })
    }

    /// Like [`resolve`](RefDatabase::resolve), `Ok(None)` when any ref along
    /// the chain is absent.
    fn resolve_if_present(&self, name: &str) -> RefResult<Option<ObjectId>> {
        let mut current = name.to_string();
        for _ in 0..=MAX_SYMBOLIC_DEPTH {
            match self.read(&current)? {
                None => return Ok(None),
                Some(RefValue::Direct(id)) => return Ok(Some(id)),
                Some(RefValue::Symbolic(target)) => current = target,
            }
        }
        Err(RefError::SymbolicLoop {
            name: name.to_string(),
        })
    }

    /// Point `name` at `new` if it currently points at `old_expected`
    /// (`None`: the ref must not exist yet).
    fn update(&self, name: &str, old_expected: Option<ObjectId>, new: ObjectId) -> RefResult<bool> {
        let expected = old_expected.map(RefValue::Direct);
        let swapped = self.compare_and_swap(name, expected.as_ref(), Some(RefValue::Direct(new)))?;
        if !swapped {
            debug!(refname = name, new = %new.short_hex(), "ref update rejected");
        }
        Ok(swapped)
    }

    /// Delete `name` if it currently points at `old_expected`, or whatever it
    /// points at when `old_expected` is `None`. Returns `false` if nothing was
    /// deleted.
    fn delete(&self, name: &str, old_expected: Option<ObjectId>) -> RefResult<bool> {
        let expected = match old_expected {
            Some(id) => RefValue::Direct(id),
            None => match self.read(name)? {
                Some(value) => value,
                None => return Ok(false),
            },
        };
        self.compare_and_swap(name, Some(&expected), None)
    }

    /// Make `name` a symbolic ref to `target`, replacing any current value.
    fn put_symbolic(&self, name: &str, target: &str) -> RefResult<()> {
        validate_ref_name(target)?;
        self.put(name, RefValue::Symbolic(target.to_string()))
    }

    /// Unconditionally set `name` to `value`.
    fn put(&self, name: &str, value: RefValue) -> RefResult<()> {
        loop {
            let current = self.read(name)?;
            if self.compare_and_swap(name, current.as_ref(), Some(value.clone()))? {
                return Ok(());
            }
        }
    }

    /// All refs under the namespace `prefix`, which is treated as a whole
    /// path component: `refs/heads` lists `refs/heads/main` but not
    /// `refs/headsup`.
    fn list_by_namespace(&self, prefix: &str) -> RefResult<Vec<Ref>> {
        if prefix.is_empty() || prefix.ends_with('/') {
            return self.list(prefix);
        }
        self.list(&format!("{prefix}/"))
    }
}
