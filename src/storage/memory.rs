//! In-memory storage for Atrium.
//!
//! `MemoryStorage` is the last tier of the storage stack and the test
//! double for the durable adapters. Contents live for the process only.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Result;
use crate::storage::{StorageAdapter, StorageUsage};

/// In-memory implementation of [`StorageAdapter`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
    quota: u64,
}

impl MemoryStorage {
    /// Create an empty store with the given quota.
    pub fn new(quota: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota,
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageAdapter for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().unwrap().clear();
        Ok(())
    }

    fn usage(&self) -> Result<StorageUsage> {
        let used: u64 = self
            .entries
            .read()
            .unwrap()
            .iter()
            .map(|(key, value)| (key.len() + value.len()) as u64)
            .sum();
        Ok(StorageUsage::new(self.quota, used))
    }
}
