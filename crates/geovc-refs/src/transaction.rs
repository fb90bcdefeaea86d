//! Optimistic ref transactions.
//!
//! A transaction stages ref changes under `transactions/<id>/changed/` in the
//! parent database so other processes can see what is in flight, and keeps
//! the authoritative staged state in memory. The first time a transaction
//! writes a ref it records the parent's value at that moment; at commit every
//! recorded value is checked against the parent again and the changes are
//! published with compare-and-swap.

use std::collections::BTreeMap;
use std::sync::Arc;

use geovc_types::ObjectId;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{RefError, RefResult};
use crate::names::{validate_ref_name, TRANSACTIONS_PREFIX};
use crate::traits::{RefDatabase, MAX_SYMBOLIC_DEPTH};
use crate::types::{Ref, RefValue};

/// A ref whose value a transaction changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangedRef {
    pub name: String,
    /// Parent value when the transaction first touched the ref.
    pub old: Option<RefValue>,
    pub new: Option<RefValue>,
}

#[derive(Debug)]
struct Staged {
    expected: Option<RefValue>,
    current: Option<RefValue>,
}

/// A set of ref updates applied all together or not at all.
pub struct RefTransaction {
    id: Uuid,
    parent: Arc<dyn RefDatabase>,
    namespace: String,
    staged: BTreeMap<String, Staged>,
    open: bool,
}

impl RefTransaction {
    /// Open a transaction against `parent`.
    pub fn begin(parent: Arc<dyn RefDatabase>) -> Self {
        let id = Uuid::now_v7();
        let namespace = format!("{TRANSACTIONS_PREFIX}{id}/");
        debug!(transaction = %id, "transaction started");
        Self {
            id,
            parent,
            namespace,
            staged: BTreeMap::new(),
            open: true,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The parent-database prefix holding this transaction's staged refs.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn ensure_open(&self) -> RefResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(RefError::TransactionClosed)
        }
    }

    fn mirror_name(&self, name: &str) -> String {
        format!("{}changed/{name}", self.namespace)
    }

    /// Value of `name` as seen inside the transaction.
    pub fn read(&self, name: &str) -> RefResult<Option<RefValue>> {
        self.ensure_open()?;
        match self.staged.get(name) {
            Some(staged) => Ok(staged.current.clone()),
            None => self.parent.read(name),
        }
    }

    /// Follow symbolic refs inside the transaction's view.
    pub fn resolve(&self, name: &str) -> RefResult<ObjectId> {
        let mut current = name.to_string();
        for _ in 0..=MAX_SYMBOLIC_DEPTH {
            match self.read(&current)? {
                None => {
                    return Err(RefError::NotFound {
                        name: name.to_string(),
                    })
                }
                Some(RefValue::Direct(id)) => return Ok(id),
                Some(RefValue::Symbolic(target)) => current = target,
            }
        }
        Err(RefError::SymbolicLoop {
            name: name.to_string(),
        })
    }

    /// Refs under `prefix` as seen inside the transaction, sorted by name.
    pub fn list(&self, prefix: &str) -> RefResult<Vec<Ref>> {
        self.ensure_open()?;
        let mut view: BTreeMap<String, RefValue> = self
            .parent
            .list(prefix)?
            .into_iter()
            .map(|r| (r.name, r.value))
            .collect();
        for (name, staged) in self.staged.range(prefix.to_string()..) {
            if !name.starts_with(prefix) {
                break;
            }
            match &staged.current {
                Some(value) => view.insert(name.clone(), value.clone()),
                None => view.remove(name),
            };
        }
        Ok(view.into_iter().map(|(name, value)| Ref::new(name, value)).collect())
    }

    /// Compare-and-swap against the transaction's view of `name`.
    pub fn compare_and_swap(
        &mut self,
        name: &str,
        expected: Option<&RefValue>,
        new: Option<RefValue>,
    ) -> RefResult<bool> {
        self.ensure_open()?;
        validate_ref_name(name)?;
        if !self.staged.contains_key(name) {
            let observed = self.parent.read(name)?;
            if observed.as_ref() != expected {
                return Ok(false);
            }
            self.staged.insert(
                name.to_string(),
                Staged {
                    expected: observed.clone(),
                    current: observed,
                },
            );
        }

        let mirror = self.mirror_name(name);
        let Some(staged) = self.staged.get_mut(name) else {
            return Ok(false);
        };
        if staged.current.as_ref() != expected {
            debug!(transaction = %self.id, refname = name, "staged update rejected");
            return Ok(false);
        }
        staged.current = new.clone();
        match new {
            Some(value) => self.parent.put(&mirror, value)?,
            None => {
                self.parent.delete(&mirror, None)?;
            }
        }
        Ok(true)
    }

    /// Point `name` at `new` if the transaction sees it at `old_expected`.
    pub fn update(&mut self, name: &str, old_expected: Option<ObjectId>, new: ObjectId) -> RefResult<bool> {
        let expected = old_expected.map(RefValue::Direct);
        self.compare_and_swap(name, expected.as_ref(), Some(RefValue::Direct(new)))
    }

    /// Delete `name` if the transaction sees it at `old_expected`, or
    /// unconditionally when `old_expected` is `None`.
    pub fn delete(&mut self, name: &str, old_expected: Option<ObjectId>) -> RefResult<bool> {
        let expected = match old_expected {
            Some(id) => RefValue::Direct(id),
            None => match self.read(name)? {
                Some(value) => value,
                None => return Ok(false),
            },
        };
        self.compare_and_swap(name, Some(&expected), None)
    }

    /// Make `name` a symbolic ref to `target` inside the transaction.
    pub fn put_symbolic(&mut self, name: &str, target: &str) -> RefResult<()> {
        validate_ref_name(target)?;
        let current = self.read(name)?;
        self.compare_and_swap(name, current.as_ref(), Some(RefValue::Symbolic(target.to_string())))?;
        Ok(())
    }

    /// Refs whose staged value differs from the value first observed.
    pub fn changed_refs(&self) -> Vec<ChangedRef> {
        self.staged
            .iter()
            .filter(|(_, s)| s.expected != s.current)
            .map(|(name, s)| ChangedRef {
                name: name.clone(),
                old: s.expected.clone(),
                new: s.current.clone(),
            })
            .collect()
    }

    /// Publish every change to the parent database.
    ///
    /// Fails with [`RefError::TransactionConflict`] if any touched ref moved
    /// in the parent since the transaction first touched it; in that case no
    /// change remains applied. The staging namespace is discarded either way.
    pub fn commit(mut self) -> RefResult<Vec<ChangedRef>> {
        self.ensure_open()?;
        let result = self.publish();
        self.discard()?;
        let changes = result?;
        info!(transaction = %self.id, refs = changes.len(), "transaction committed");
        Ok(changes)
    }

    fn publish(&self) -> RefResult<Vec<ChangedRef>> {
        let changes = self.changed_refs();
        for change in &changes {
            if self.parent.read(&change.name)? != change.old {
                debug!(transaction = %self.id, refname = %change.name, "commit validation failed");
                return Err(RefError::TransactionConflict {
                    name: change.name.clone(),
                });
            }
        }

        let mut applied: Vec<&ChangedRef> = Vec::new();
        for change in &changes {
            if self
                .parent
                .compare_and_swap(&change.name, change.old.as_ref(), change.new.clone())?
            {
                applied.push(change);
                continue;
            }
            for done in applied.iter().rev() {
                if !self
                    .parent
                    .compare_and_swap(&done.name, done.new.as_ref(), done.old.clone())?
                {
                    warn!(transaction = %self.id, refname = %done.name, "rollback lost a race");
                }
            }
            return Err(RefError::TransactionConflict {
                name: change.name.clone(),
            });
        }
        Ok(changes)
    }

    /// Discard all staged changes.
    pub fn abort(mut self) -> RefResult<()> {
        self.ensure_open()?;
        self.discard()?;
        debug!(transaction = %self.id, "transaction aborted");
        Ok(())
    }

    fn discard(&mut self) -> RefResult<()> {
        self.open = false;
        self.staged.clear();
        self.parent.remove_all(&self.namespace)?;
        Ok(())
    }
}

impl Drop for RefTransaction {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.discard() {
                warn!(transaction = %self.id, error = %e, "failed to discard dropped transaction");
            }
        }
    }
}

impl std::fmt::Debug for RefTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefTransaction")
            .field("id", &self.id)
            .field("staged", &self.staged.len())
            .field("open", &self.open)
            .finish()
    }
}
