//! Configuration loading for Atrium.
//!
//! Configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. User config (`~/.atrium/config.toml`)
//! 3. Defaults (lowest priority)
//!
//! All configuration is optional. The engine runs with sensible defaults
//! when no config exists.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AtriumError, Result};

/// Main configuration struct for Atrium.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Sync engine configuration.
    pub sync: SyncConfig,
    /// Capped-list size limits.
    pub caps: CapsConfig,
    /// Durable storage configuration.
    pub storage: StorageConfig,
    /// Session/auth configuration.
    pub session: SessionConfig,
}

/// Sync engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between periodic drain passes while a portal is attached.
    pub interval_seconds: u64,
    /// Default retry budget for offline actions that don't carry their own.
    pub default_max_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 30,
            default_max_retries: 3,
        }
    }
}

/// Minimum valid sync interval (a zero interval would spin the drain loop).
pub const MIN_INTERVAL_SECONDS: u64 = 1;

impl SyncConfig {
    /// Check if an interval value is valid (must be >= 1 second).
    pub fn is_valid_interval(value: u64) -> bool {
        value >= MIN_INTERVAL_SECONDS
    }
}

/// Capped-list size limits.
///
/// Inserts into capped lists are O(1) prepend + truncate; these caps bound
/// the resident size of the state tree, never its correctness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CapsConfig {
    /// Maximum entries in `learning.recent_activities` via `AddActivity`.
    pub recent_activities: usize,
    /// Maximum entries kept when archiving an ended session.
    pub session_archive: usize,
    /// Maximum entries in `ui.notifications`.
    pub notifications: usize,
}

impl Default for CapsConfig {
    fn default() -> Self {
        Self {
            recent_activities: 100,
            session_archive: 50,
            notifications: 20,
        }
    }
}

/// Durable storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Key namespace prefix; the fallback tier only ever clears keys under it.
    pub namespace: String,
    /// Advisory quota in bytes reported by `usage()`.
    pub quota_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: "atrium".to_string(),
            quota_bytes: 5 * 1024 * 1024,
        }
    }
}

impl StorageConfig {
    /// The storage key for the persisted global state record.
    pub fn state_key(&self) -> String {
        format!("{}-global-state", self.namespace)
    }
}

/// Session/auth configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Hours after a token is set before the session expires.
    pub expiry_hours: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { expiry_hours: 24 }
    }
}

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// Precedence (highest to lowest):
    /// 1. Environment variables
    /// 2. User config (`~/.atrium/config.toml`)
    /// 3. Defaults
    pub fn load() -> Self {
        let mut config = Config::default();

        if let Some(home) = atrium_home() {
            let config_path = home.join("config.toml");
            if let Ok(user_config) = Self::load_from_file(&config_path) {
                config = user_config;
            }
        }

        config.apply_env_overrides();
        config
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| AtriumError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| AtriumError::config(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // ATRIUM_SYNC_INTERVAL
        if let Ok(val) = env::var("ATRIUM_SYNC_INTERVAL") {
            match val.parse::<u64>() {
                Ok(n) => {
                    if SyncConfig::is_valid_interval(n) {
                        self.sync.interval_seconds = n;
                    } else {
                        tracing::warn!(
                            "Invalid ATRIUM_SYNC_INTERVAL value '{}'. Must be >= {}. \
                            Using default '{}'.",
                            n,
                            MIN_INTERVAL_SECONDS,
                            self.sync.interval_seconds
                        );
                    }
                }
                Err(_) => tracing::warn!(
                    "Invalid ATRIUM_SYNC_INTERVAL value '{}'. Expected a positive \
                    integer. Using default '{}'.",
                    val,
                    self.sync.interval_seconds
                ),
            }
        }

        // ATRIUM_MAX_RETRIES
        if let Ok(val) = env::var("ATRIUM_MAX_RETRIES") {
            match val.parse::<u32>() {
                Ok(n) => self.sync.default_max_retries = n,
                Err(_) => tracing::warn!(
                    "Invalid ATRIUM_MAX_RETRIES value '{}'. Expected a positive \
                    integer. Using default '{}'.",
                    val,
                    self.sync.default_max_retries
                ),
            }
        }

        // ATRIUM_STORAGE_NAMESPACE
        if let Ok(val) = env::var("ATRIUM_STORAGE_NAMESPACE") {
            if val.is_empty() {
                tracing::warn!("ATRIUM_STORAGE_NAMESPACE is empty, using default");
            } else {
                self.storage.namespace = val;
            }
        }

        // ATRIUM_STORAGE_QUOTA
        if let Ok(val) = env::var("ATRIUM_STORAGE_QUOTA") {
            match val.parse::<u64>() {
                Ok(n) => self.storage.quota_bytes = n,
                Err(_) => tracing::warn!(
                    "Invalid ATRIUM_STORAGE_QUOTA value '{}'. Expected a byte count. \
                    Using default '{}'.",
                    val,
                    self.storage.quota_bytes
                ),
            }
        }

        // ATRIUM_SESSION_EXPIRY_HOURS
        if let Ok(val) = env::var("ATRIUM_SESSION_EXPIRY_HOURS") {
            match val.parse::<i64>() {
                Ok(n) if n > 0 => self.session.expiry_hours = n,
                _ => tracing::warn!(
                    "Invalid ATRIUM_SESSION_EXPIRY_HOURS value '{}'. Expected a \
                    positive integer. Using default '{}'.",
                    val,
                    self.session.expiry_hours
                ),
            }
        }
    }
}

/// Get the Atrium home directory.
///
/// Checks `ATRIUM_HOME` first, then falls back to `~/.atrium`.
/// Invalid values are ignored and we fall back to the default.
pub fn atrium_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("ATRIUM_HOME") {
        if home.is_empty() {
            tracing::warn!("ATRIUM_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("ATRIUM_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(".atrium"));
    }

    // Fallback for containerized/minimal environments without HOME
    let fallback = std::env::temp_dir().join("atrium");
    tracing::warn!("HOME not set, using fallback location: {}", fallback.display());
    Some(fallback)
}

/// Get the structured storage directory.
///
/// Returns `<atrium_home>/state/`.
pub fn state_dir() -> Option<PathBuf> {
    atrium_home().map(|h| h.join("state"))
}

/// Get the flat fallback store path.
///
/// Returns `<atrium_home>/flat-store.json`.
pub fn flat_store_path() -> Option<PathBuf> {
    atrium_home().map(|h| h.join("flat-store.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.sync.interval_seconds, 30);
        assert_eq!(config.sync.default_max_retries, 3);

        assert_eq!(config.caps.recent_activities, 100);
        assert_eq!(config.caps.session_archive, 50);
        assert_eq!(config.caps.notifications, 20);

        assert_eq!(config.storage.namespace, "atrium");
        assert_eq!(config.storage.quota_bytes, 5 * 1024 * 1024);

        assert_eq!(config.session.expiry_hours, 24);
    }

    #[test]
    fn test_state_key() {
        let config = Config::default();
        assert_eq!(config.storage.state_key(), "atrium-global-state");

        let custom = StorageConfig {
            namespace: "portal".to_string(),
            ..StorageConfig::default()
        };
        assert_eq!(custom.state_key(), "portal-global-state");
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        let toml_content = r#"
[sync]
interval_seconds = 60
default_max_retries = 5

[caps]
notifications = 10
"#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();

        assert_eq!(config.sync.interval_seconds, 60);
        assert_eq!(config.sync.default_max_retries, 5);
        assert_eq!(config.caps.notifications, 10);

        // Other fields should be defaults
        assert_eq!(config.caps.recent_activities, 100);
        assert_eq!(config.storage.namespace, "atrium");
    }

    #[test]
    fn test_load_from_file_missing() {
        let result = Config::load_from_file(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, "this is not valid toml [[[").unwrap();

        let result = Config::load_from_file(&config_path);
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_env_var_overrides() {
        env::set_var("ATRIUM_SYNC_INTERVAL", "15");
        env::set_var("ATRIUM_MAX_RETRIES", "7");
        env::set_var("ATRIUM_STORAGE_NAMESPACE", "classroom");
        env::set_var("ATRIUM_STORAGE_QUOTA", "1048576");
        env::set_var("ATRIUM_SESSION_EXPIRY_HOURS", "12");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.sync.interval_seconds, 15);
        assert_eq!(config.sync.default_max_retries, 7);
        assert_eq!(config.storage.namespace, "classroom");
        assert_eq!(config.storage.quota_bytes, 1048576);
        assert_eq!(config.session.expiry_hours, 12);

        env::remove_var("ATRIUM_SYNC_INTERVAL");
        env::remove_var("ATRIUM_MAX_RETRIES");
        env::remove_var("ATRIUM_STORAGE_NAMESPACE");
        env::remove_var("ATRIUM_STORAGE_QUOTA");
        env::remove_var("ATRIUM_SESSION_EXPIRY_HOURS");
    }

    #[test]
    #[serial]
    fn test_env_var_invalid_interval_ignored() {
        env::set_var("ATRIUM_SYNC_INTERVAL", "0");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.sync.interval_seconds, 30);

        env::set_var("ATRIUM_SYNC_INTERVAL", "not-a-number");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.sync.interval_seconds, 30);

        env::remove_var("ATRIUM_SYNC_INTERVAL");
    }

    #[test]
    #[serial]
    fn test_env_var_empty_namespace_ignored() {
        env::set_var("ATRIUM_STORAGE_NAMESPACE", "");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.storage.namespace, "atrium");

        env::remove_var("ATRIUM_STORAGE_NAMESPACE");
    }

    #[test]
    #[serial]
    fn test_env_var_invalid_expiry_ignored() {
        env::set_var("ATRIUM_SESSION_EXPIRY_HOURS", "-5");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.session.expiry_hours, 24);

        env::remove_var("ATRIUM_SESSION_EXPIRY_HOURS");
    }

    #[test]
    #[serial]
    fn test_atrium_home_with_env() {
        let dir = TempDir::new().unwrap();
        env::set_var("ATRIUM_HOME", dir.path().to_str().unwrap());

        let home = atrium_home().unwrap();
        assert_eq!(home, dir.path());

        env::remove_var("ATRIUM_HOME");
    }

    #[test]
    #[serial]
    fn test_atrium_home_fallback() {
        env::remove_var("ATRIUM_HOME");

        let home = atrium_home();
        assert!(home.is_some());
        assert!(home.unwrap().ends_with(".atrium"));
    }

    #[test]
    #[serial]
    fn test_atrium_home_empty_env() {
        env::set_var("ATRIUM_HOME", "");

        let home = atrium_home();
        assert!(home.is_some());
        assert!(home.unwrap().ends_with(".atrium"));

        env::remove_var("ATRIUM_HOME");
    }

    #[test]
    #[serial]
    fn test_state_dir_and_flat_store_path() {
        let dir = TempDir::new().unwrap();
        env::set_var("ATRIUM_HOME", dir.path().to_str().unwrap());

        assert_eq!(state_dir().unwrap(), dir.path().join("state"));
        assert_eq!(flat_store_path().unwrap(), dir.path().join("flat-store.json"));

        env::remove_var("ATRIUM_HOME");
    }

    #[test]
    #[serial]
    fn test_load_precedence_env_over_file() {
        let dir = TempDir::new().unwrap();
        env::set_var("ATRIUM_HOME", dir.path().to_str().unwrap());

        let toml_content = r#"
[sync]
interval_seconds = 60
"#;
        fs::write(dir.path().join("config.toml"), toml_content).unwrap();

        env::set_var("ATRIUM_SYNC_INTERVAL", "5");

        let config = Config::load();

        // Env var takes precedence over the user config file
        assert_eq!(config.sync.interval_seconds, 5);

        env::remove_var("ATRIUM_SYNC_INTERVAL");
        env::remove_var("ATRIUM_HOME");
    }

    #[test]
    fn test_full_toml_roundtrip() {
        let config = Config {
            sync: SyncConfig {
                interval_seconds: 45,
                default_max_retries: 2,
            },
            caps: CapsConfig {
                recent_activities: 64,
                session_archive: 32,
                notifications: 8,
            },
            storage: StorageConfig {
                namespace: "test".to_string(),
                quota_bytes: 1024,
            },
            session: SessionConfig { expiry_hours: 6 },
        };

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_content = r#"
[storage]
namespace = "district"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();

        assert_eq!(config.storage.namespace, "district");
        assert_eq!(config.storage.quota_bytes, 5 * 1024 * 1024);
        assert_eq!(config.sync.interval_seconds, 30);
        assert_eq!(config.caps.notifications, 20);
    }
}
