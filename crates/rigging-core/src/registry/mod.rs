//! Address registry: the single source of truth for "what exists where".
//!
//! Entries keep insertion order, which is the order components were
//! deployed in.

pub mod store;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::OrchestrationError;
use crate::types::{Address, ModuleKey};

pub use store::{RegistryError, RegistryStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Unchanged,
}

/// Mapping of module key to deployed address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressRegistry {
    entries: IndexMap<ModuleKey, Address>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ModuleKey) -> Option<&Address> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &ModuleKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Record an address for `key`.
    ///
    /// Re-recording the same address is a no-op; a different address for an
    /// existing key is rejected.
    pub fn put(
        &mut self,
        key: ModuleKey,
        address: Address,
    ) -> Result<PutOutcome, OrchestrationError> {
        match self.entries.get(&key) {
            Some(existing) if *existing == address => Ok(PutOutcome::Unchanged),
            Some(existing) => Err(OrchestrationError::RegistryConflict {
                existing: existing.clone(),
                attempted: address,
                key,
            }),
            None => {
                self.entries.insert(key, address);
                Ok(PutOutcome::Inserted)
            }
        }
    }

    /// Forget an entry written by a run that never completed.
    pub(crate) fn discard(&mut self, key: &ModuleKey) -> Option<Address> {
        self.entries.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModuleKey, &Address)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ModuleKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
