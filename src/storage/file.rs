//! File-backed storage for Atrium.
//!
//! Values are stored one file per key under `~/.atrium/state/`.
//! Atomic writes are achieved via temp file + rename pattern.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::config::{state_dir, StorageConfig};
use crate::error::{AtriumError, Result};
use crate::storage::{StorageAdapter, StorageUsage};

/// File-backed storage adapter, the primary tier of the storage stack.
///
/// Stores each value in its own file in a configurable directory.
/// Uses atomic writes via temp file + rename pattern.
#[derive(Debug, Clone)]
pub struct FileStorage {
    /// Directory where value files are stored.
    dir: PathBuf,
    /// Capacity used for usage reporting.
    quota: u64,
}

impl FileStorage {
    /// Create a file storage adapter with the default directory.
    ///
    /// Uses `~/.atrium/state/` or `$ATRIUM_HOME/state/`.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let dir = state_dir().ok_or_else(|| {
            AtriumError::config("Could not determine state directory (no home directory)")
        })?;
        Self::with_dir(dir, config.quota_bytes)
    }

    /// Create a file storage adapter with a custom directory.
    pub fn with_dir(dir: impl Into<PathBuf>, quota: u64) -> Result<Self> {
        let dir = dir.into();

        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| AtriumError::storage(&dir, e))?;
        }

        Ok(Self { dir, quota })
    }

    /// Get the path for a key's value file.
    fn value_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }

    /// Get the path for a temp file used during atomic writes.
    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", sanitize_key(key)))
    }
}

/// Map a key to a safe file stem. Keys are namespace-prefixed
/// identifiers, so only separators need rewriting.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl StorageAdapter for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.value_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| AtriumError::storage(&path, e))?;

        Ok(Some(content))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let final_path = self.value_path(key);
        let temp_path = self.temp_path(key);

        {
            let mut file =
                fs::File::create(&temp_path).map_err(|e| AtriumError::storage(&temp_path, e))?;
            file.write_all(value.as_bytes())
                .map_err(|e| AtriumError::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| AtriumError::storage(&temp_path, e))?;
        }

        // Rename temp file to final path (atomic on POSIX)
        fs::rename(&temp_path, &final_path).map_err(|e| AtriumError::storage(&final_path, e))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.value_path(key);

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AtriumError::storage(&path, e)),
        }
    }

    fn clear(&self) -> Result<()> {
        if !self.dir.exists() {
            return Ok(());
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| AtriumError::storage(&self.dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| AtriumError::storage(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                fs::remove_file(&path).map_err(|e| AtriumError::storage(&path, e))?;
            }
        }

        Ok(())
    }

    fn usage(&self) -> Result<StorageUsage> {
        let mut used = 0u64;

        if self.dir.exists() {
            let entries =
                fs::read_dir(&self.dir).map_err(|e| AtriumError::storage(&self.dir, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| AtriumError::storage(&self.dir, e))?;
                if let Ok(metadata) = entry.metadata() {
                    if metadata.is_file() {
                        used += metadata.len();
                    }
                }
            }
        }

        Ok(StorageUsage::new(self.quota, used))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::tests::test_storage_adapter_crud;
    use tempfile::TempDir;

    fn storage() -> (TempDir, FileStorage) {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::with_dir(dir.path(), 1024 * 1024).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_file_storage_conformance() {
        let (_dir, storage) = storage();
        test_storage_adapter_crud(&storage);
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let storage = FileStorage::with_dir(dir.path(), 1024).unwrap();
            storage.set("atrium-global-state", "{\"v\":1}").unwrap();
        }

        let storage = FileStorage::with_dir(dir.path(), 1024).unwrap();
        assert_eq!(
            storage.get("atrium-global-state").unwrap().as_deref(),
            Some("{\"v\":1}")
        );
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (dir, storage) = storage();
        storage.set("key", "value").unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_sanitizes_awkward_keys() {
        let (_dir, storage) = storage();
        storage.set("ns:state/main", "v").unwrap();
        assert_eq!(storage.get("ns:state/main").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_usage_reflects_file_sizes() {
        let (_dir, storage) = storage();
        storage.set("key", "0123456789").unwrap();

        let usage = storage.usage().unwrap();
        assert_eq!(usage.used, 10);
    }
}
