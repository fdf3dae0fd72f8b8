//! Storage adapters for Atrium.
//!
//! The persistence layer writes through a [`StorageAdapter`]: file-backed
//! per-key storage as the primary tier, a single flat file as the
//! fallback, and an in-memory store for tests and last-resort operation.
//! [`TieredStorage`] chains tiers so that one failing tier degrades
//! rather than breaks persistence.

pub mod file;
pub mod flat;
pub mod memory;
pub mod tiered;
pub mod traits;

pub use file::FileStorage;
pub use flat::FlatStorage;
pub use memory::MemoryStorage;
pub use tiered::TieredStorage;
pub use traits::{StorageAdapter, StorageUsage};

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::error::Result;

/// Build the default storage stack: file-backed primary, flat-file
/// fallback, assembled per the storage configuration.
pub fn default_stack(config: &StorageConfig) -> Result<Arc<dyn StorageAdapter>> {
    let primary = Arc::new(FileStorage::new(config)?);
    let fallback = Arc::new(FlatStorage::new(config)?);
    Ok(Arc::new(TieredStorage::new(primary, fallback)))
}
