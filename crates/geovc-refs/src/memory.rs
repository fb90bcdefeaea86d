//! In-memory reference database for tests and ephemeral repositories.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tracing::debug;

use crate::error::{RefError, RefResult};
use crate::names::validate_ref_name;
use crate::traits::RefDatabase;
use crate::types::{Ref, RefValue};

/// An in-memory implementation of [`RefDatabase`].
///
/// Refs live in a `BTreeMap` behind a `RwLock`, so listings come out sorted.
#[derive(Debug, Default)]
pub struct InMemoryRefDatabase {
    refs: RwLock<BTreeMap<String, RefValue>>,
}

impl InMemoryRefDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.refs.read().map(|refs| refs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> RefError {
    RefError::Backend(format!("lock poisoned: {e}"))
}

impl RefDatabase for InMemoryRefDatabase {
    fn read(&self, name: &str) -> RefResult<Option<RefValue>> {
        let refs = self.refs.read().map_err(poisoned)?;
        Ok(refs.get(name).cloned())
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<&RefValue>,
        new: Option<RefValue>,
    ) -> RefResult<bool> {
        validate_ref_name(name)?;
        let mut refs = self.refs.write().map_err(poisoned)?;
        if refs.get(name) != expected {
            debug!(refname = name, "compare-and-swap rejected");
            return Ok(false);
        }
        match new {
            Some(value) => {
                refs.insert(name.to_string(), value);
            }
            None => {
                refs.remove(name);
            }
        }
        Ok(true)
    }

    fn list(&self, prefix: &str) -> RefResult<Vec<Ref>> {
        let refs = self.refs.read().map_err(poisoned)?;
        Ok(refs
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, value)| Ref::new(name.clone(), value.clone()))
            .collect())
    }

    fn remove_all(&self, prefix: &str) -> RefResult<Vec<Ref>> {
        let mut refs = self.refs.write().map_err(poisoned)?;
        let names: Vec<String> = refs
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect();
        Ok(names
            .into_iter()
            .filter_map(|name| refs.remove(&name).map(|value| Ref::new(name, value)))
            .collect())
    }
}
