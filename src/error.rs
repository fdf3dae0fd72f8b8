//! Unified error types for Atrium with fail-open philosophy.
//!
//! Nothing in this crate throws out to UI code. When infrastructure fails
//! (storage, serialization, the remote backend), we log a warning and
//! degrade to a safe default: empty storage, fresh state, a dropped queued
//! action surfaced through the conflict list.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for Atrium operations.
#[derive(Error, Debug)]
pub enum AtriumError {
    /// I/O errors from a storage tier.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON parsing/serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading errors.
    #[error("config error: {message}")]
    Config { message: String },

    /// Cross-portal channel errors (publish to a closed bus, bad envelope).
    #[error("channel error: {message}")]
    Channel { message: String },

    /// Remote backend errors during offline-action replay.
    #[error("backend error: {message}")]
    Backend { message: String },

    /// Persisted payload carries a schema version we cannot migrate.
    #[error("migration error: {message}")]
    Migration { message: String },
}

/// A specialized Result type for Atrium operations.
pub type Result<T> = std::result::Result<T, AtriumError>;

impl AtriumError {
    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a channel error.
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Create a migration error.
    pub fn migration(message: impl Into<String>) -> Self {
        Self::Migration {
            message: message.into(),
        }
    }
}

impl From<io::Error> for AtriumError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for AtriumError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Trait for fail-open error handling.
///
/// Failure paths in the sync core never propagate to the embedding UI:
/// log the error and return a safe default instead.
pub trait FailOpen<T> {
    /// Handle an error by logging a warning and returning the default value.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;

    /// Handle an error by logging a warning and returning the provided fallback.
    fn fail_open_with(self, context: &str, fallback: T) -> T;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using default)", context, err);
                T::default()
            }
        }
    }

    fn fail_open_with(self, context: &str, fallback: T) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using fallback)", context, err);
                fallback
            }
        }
    }
}
