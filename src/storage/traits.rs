//! Storage adapter traits for Atrium.
//!
//! This module defines the `StorageAdapter` trait that the persistence
//! layer writes through. Adapters are string-keyed string-value stores;
//! serialization happens above them.

use std::sync::Arc;

use crate::error::Result;

/// Usage report for a storage adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageUsage {
    /// Configured capacity in bytes.
    pub quota: u64,
    /// Bytes currently held.
    pub used: u64,
    /// Bytes remaining before the quota is hit.
    pub available: u64,
}

impl StorageUsage {
    pub fn new(quota: u64, used: u64) -> Self {
        Self {
            quota,
            used,
            available: quota.saturating_sub(used),
        }
    }
}

/// Trait for durable key-value storage backends.
///
/// Implementations store opaque string values under string keys within a
/// namespace. All operations are synchronous; callers that must not block
/// on storage wrap errors with fail-open handling.
pub trait StorageAdapter: Send + Sync {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value under a key, replacing any existing value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key.
    ///
    /// Returns `Ok(())` even if the key doesn't exist.
    fn remove(&self, key: &str) -> Result<()>;

    /// Remove every key in this adapter's namespace.
    fn clear(&self) -> Result<()>;

    /// Report quota and current usage.
    fn usage(&self) -> Result<StorageUsage>;

    /// Check if a key exists.
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Blanket implementation of StorageAdapter for Arc-wrapped adapters.
///
/// This allows using `Arc<T>` where `T: StorageAdapter` is expected,
/// which is useful for sharing adapters between tiers and tests.
impl<T: StorageAdapter + ?Sized> StorageAdapter for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }

    fn usage(&self) -> Result<StorageUsage> {
        (**self).usage()
    }
}
