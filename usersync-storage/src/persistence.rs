//! The cache persistence boundary.

use crate::error::StorageResult;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// One persisted entry: `(entry key, serialized value)`.
pub type PersistedEntry = (String, String);

/// Durable cache of ordered entries, grouped by store key.
///
/// `save` replaces everything stored under `store_key`. `load` returns
/// `None` when nothing was ever saved under that key.
pub trait Persistence: Send + Sync {
    fn save(&self, store_key: &str, entries: &[PersistedEntry]) -> StorageResult<()>;

    fn load(&self, store_key: &str) -> StorageResult<Option<Vec<PersistedEntry>>>;
}

/// In-process persistence. Survives store re-creation within one process,
/// which is what tests use to simulate a restart.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    stores: Mutex<HashMap<String, Vec<PersistedEntry>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store keys that currently hold data.
    pub fn store_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl Persistence for MemoryPersistence {
    fn save(&self, store_key: &str, entries: &[PersistedEntry]) -> StorageResult<()> {
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(store_key.to_string(), entries.to_vec());
        Ok(())
    }

    fn load(&self, store_key: &str) -> StorageResult<Option<Vec<PersistedEntry>>> {
        Ok(self
            .stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(store_key)
            .cloned())
    }
}
