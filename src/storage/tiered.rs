//! Tiered storage with automatic fallback.
//!
//! `TieredStorage` chains a primary adapter with a fallback. Writes land
//! in exactly one tier: the primary when it is healthy, the fallback when
//! the primary errors. An operation only fails when both tiers fail.

use std::sync::Arc;

use crate::error::Result;
use crate::storage::{StorageAdapter, StorageUsage};

/// Two-tier implementation of [`StorageAdapter`].
pub struct TieredStorage {
    primary: Arc<dyn StorageAdapter>,
    fallback: Arc<dyn StorageAdapter>,
}

impl TieredStorage {
    pub fn new(primary: Arc<dyn StorageAdapter>, fallback: Arc<dyn StorageAdapter>) -> Self {
        Self { primary, fallback }
    }
}

impl StorageAdapter for TieredStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.primary.get(key) {
            Ok(Some(value)) => Ok(Some(value)),
            // The key may have landed in the fallback during a primary
            // outage, so a miss still consults the second tier.
            Ok(None) => self.fallback.get(key),
            Err(e) => {
                tracing::warn!("primary storage read failed for '{}': {}", key, e);
                self.fallback.get(key)
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        match self.primary.set(key, value) {
            Ok(()) => {
                // Keep each key single-homed: a stale fallback copy would
                // shadow deletes and confuse usage accounting.
                if let Err(e) = self.fallback.remove(key) {
                    tracing::warn!("could not drop fallback copy of '{}': {}", key, e);
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!("primary storage write failed for '{}': {}", key, e);
                self.fallback.set(key, value)
            }
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        let primary = self.primary.remove(key);
        let fallback = self.fallback.remove(key);

        match (primary, fallback) {
            (Err(p), Err(f)) => {
                tracing::warn!("fallback storage remove also failed for '{}': {}", key, f);
                Err(p)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => {
                tracing::warn!("one storage tier failed removing '{}': {}", key, e);
                Ok(())
            }
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    fn clear(&self) -> Result<()> {
        let primary = self.primary.clear();
        let fallback = self.fallback.clear();

        match (primary, fallback) {
            (Err(p), Err(_)) => Err(p),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => {
                tracing::warn!("one storage tier failed clearing: {}", e);
                Ok(())
            }
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    fn usage(&self) -> Result<StorageUsage> {
        match self.primary.usage() {
            Ok(usage) => Ok(usage),
            Err(e) => {
                tracing::warn!("primary storage usage report failed: {}", e);
                self.fallback.usage()
            }
        }
    }
}
