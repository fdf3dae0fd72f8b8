//! Flat-file storage for Atrium.
//!
//! `FlatStorage` keeps every key in one JSON object file, the fallback
//! tier when the per-key file store is unavailable. Keys are prefixed
//! with the configured namespace so unrelated entries in a shared file
//! survive `clear`.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::config::{flat_store_path, StorageConfig};
use crate::error::{AtriumError, Result};
use crate::storage::{StorageAdapter, StorageUsage};

/// Single-file implementation of [`StorageAdapter`].
#[derive(Debug)]
pub struct FlatStorage {
    path: PathBuf,
    namespace: String,
    quota: u64,
    // Serializes read-modify-write cycles on the backing file.
    write_lock: Mutex<()>,
}

impl FlatStorage {
    /// Create a flat storage adapter at the default path.
    ///
    /// Uses `~/.atrium/flat-store.json` or `$ATRIUM_HOME/flat-store.json`.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let path = flat_store_path().ok_or_else(|| {
            AtriumError::config("Could not determine flat store path (no home directory)")
        })?;
        Self::with_path(path, &config.namespace, config.quota_bytes)
    }

    /// Create a flat storage adapter with a custom backing file.
    pub fn with_path(
        path: impl Into<PathBuf>,
        namespace: impl Into<String>,
        quota: u64,
    ) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| AtriumError::storage(parent, e))?;
            }
        }

        Ok(Self {
            path,
            namespace: namespace.into(),
            quota,
            write_lock: Mutex::new(()),
        })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| AtriumError::storage(&self.path, e))?;

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let map: BTreeMap<String, String> = serde_json::from_str(&content)?;
        Ok(map)
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(map)?;

        {
            let mut file =
                fs::File::create(&temp_path).map_err(|e| AtriumError::storage(&temp_path, e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| AtriumError::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| AtriumError::storage(&temp_path, e))?;
        }

        fs::rename(&temp_path, &self.path).map_err(|e| AtriumError::storage(&self.path, e))?;

        Ok(())
    }
}

impl StorageAdapter for FlatStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.read_map()?;
        Ok(map.get(&self.prefixed(key)).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        let mut map = self.read_map()?;
        map.insert(self.prefixed(key), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        let mut map = self.read_map()?;
        if map.remove(&self.prefixed(key)).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        let mut map = self.read_map()?;
        let prefix = format!("{}:", self.namespace);
        let before = map.len();
        map.retain(|key, _| !key.starts_with(&prefix));
        if map.len() != before {
            self.write_map(&map)?;
        }
        Ok(())
    }

    fn usage(&self) -> Result<StorageUsage> {
        let prefix = format!("{}:", self.namespace);
        let used: u64 = self
            .read_map()?
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, value)| (key.len() + value.len()) as u64)
            .sum();
        Ok(StorageUsage::new(self.quota, used))
    }
}
