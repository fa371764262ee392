// src/store/memory.rs

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::errors::Result;
use crate::store::{RecordStore, validate_key};

/// Stores records in memory only. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Place bytes under `key` without validation, e.g. to simulate a
    /// damaged record.
    pub fn insert_raw(&self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.lock().insert(key.into(), bytes.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for MemoryStore {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        validate_key(key)?;
        self.lock().insert(key.to_string(), bytes.to_vec());
        debug!(key = %key, bytes = bytes.len(), "stored record (memory)");
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.lock().get(key).cloned())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_records() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.write("a/1", b"x").unwrap();

        assert_eq!(other.read("a/1").unwrap(), Some(b"x".to_vec()));
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn keys_are_filtered_by_prefix() {
        let store = MemoryStore::new();
        for key in ["a/1", "a/2", "b/1"] {
            store.write(key, b"").unwrap();
        }
        assert_eq!(store.keys("a/").unwrap(), vec!["a/1", "a/2"]);
        assert!(store.keys("c/").unwrap().is_empty());
    }
}
