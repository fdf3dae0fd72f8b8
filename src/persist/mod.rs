//! Persistence middleware for Atrium.
//!
//! After every dispatch the store hands the new tree to [`Persistence`],
//! which partializes it (only durable slices are written), wraps it in a
//! versioned envelope, and stores it through a [`StorageAdapter`].
//! On startup the envelope is read back, migrated across schema versions
//! if needed, and merged into the initial tree.
//!
//! Persistence is fail-open in both directions: a write failure logs and
//! drops the snapshot, an unreadable envelope logs and yields a cold
//! start. Neither ever takes down a dispatch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::state::{AppState, OfflineAction, StudentProfile, Theme, UserRecord};
use crate::error::Result;
use crate::storage::StorageAdapter;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Current schema version of the persisted envelope.
pub const PERSIST_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope wrapping a persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedPayload {
    pub version: u32,
    pub state: PersistedState,
}

/// The durable subset of the state tree.
///
/// Ephemeral data (loading flags, notifications, modals, the live
/// session, connectivity) is deliberately absent; it is rebuilt at
/// runtime. The credential is also never written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub auth: PersistedAuth,
    pub students: PersistedStudents,
    pub sync: PersistedSync,
    pub ui: PersistedUi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAuth {
    pub current_user: Option<UserRecord>,
    /// Always `None` on disk; present so the written shape matches the
    /// auth slice and reads merge cleanly.
    pub token: Option<String>,
    pub session_expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedStudents {
    pub profiles: HashMap<String, StudentProfile>,
    pub active_student_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSync {
    pub offline_actions: Vec<OfflineAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedUi {
    pub theme: Theme,
    pub sidebar_open: bool,
}

/// Extract the durable subset of a tree.
pub fn partialize(state: &AppState) -> PersistedState {
    PersistedState {
        auth: PersistedAuth {
            current_user: state.auth.current_user.clone(),
            token: None,
            session_expiry: state.auth.session_expiry,
        },
        students: PersistedStudents {
            profiles: state.students.profiles.clone(),
            active_student_id: state.students.active_student_id.clone(),
        },
        sync: PersistedSync {
            offline_actions: state.sync.offline_actions.clone(),
        },
        ui: PersistedUi {
            theme: state.ui.theme,
            sidebar_open: state.ui.sidebar_open,
        },
    }
}

impl PersistedState {
    /// Merge this snapshot into a tree, leaving ephemeral fields alone.
    /// Derived fields are recomputed afterwards by the reducer's
    /// normalization, so only raw data is written here.
    pub fn apply_to(&self, state: &mut AppState) {
        state.auth.current_user = self.auth.current_user.clone();
        state.auth.is_authenticated = self.auth.current_user.is_some();
        state.auth.session_expiry = self.auth.session_expiry;
        state.students.profiles = self.students.profiles.clone();
        state.students.active_student_id = self.students.active_student_id.clone();
        state.sync.offline_actions = self.sync.offline_actions.clone();
        state.sync.status.pending_actions = state.sync.offline_actions.len();
        state.ui.theme = self.ui.theme;
        state.ui.sidebar_open = self.ui.sidebar_open;
    }
}

/// Upgrade an envelope's `state` value from `version` to the current
/// schema. Returns `None` when the version is unknown (newer than this
/// build, or nonsense), in which case the snapshot is discarded.
pub fn migrate(version: u32, mut state: Value) -> Option<Value> {
    if version > PERSIST_SCHEMA_VERSION {
        tracing::warn!(
            "persisted state has future schema version {}, discarding",
            version
        );
        return None;
    }

    if version == 0 {
        migrate_v0_to_v1(&mut state);
    }

    Some(state)
}

/// v0 named the signed-in user `auth.user` and queued actions before
/// retry bookkeeping existed.
fn migrate_v0_to_v1(state: &mut Value) {
    if let Some(auth) = state.get_mut("auth").and_then(Value::as_object_mut) {
        if let Some(user) = auth.remove("user") {
            auth.entry("currentUser").or_insert(user);
        }
    }

    if let Some(actions) = state
        .get_mut("sync")
        .and_then(|sync| sync.get_mut("offlineActions"))
        .and_then(Value::as_array_mut)
    {
        for action in actions {
            if let Some(action) = action.as_object_mut() {
                action
                    .entry("retryCount")
                    .or_insert_with(|| Value::from(0u32));
                action
                    .entry("maxRetries")
                    .or_insert_with(|| Value::from(3u32));
            }
        }
    }
}

/// Write-through persistence bound to one storage key.
pub struct Persistence {
    storage: Arc<dyn StorageAdapter>,
    key: String,
}

impl Persistence {
    pub fn new(storage: Arc<dyn StorageAdapter>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Persist the durable subset of a tree.
    pub fn save(&self, state: &AppState) -> Result<()> {
        let payload = PersistedPayload {
            version: PERSIST_SCHEMA_VERSION,
            state: partialize(state),
        };
        let json = serde_json::to_string(&payload)?;
        self.storage.set(&self.key, &json)
    }

    /// Read back the last snapshot, migrating old schemas.
    ///
    /// Returns `Ok(None)` for a cold start; an envelope that cannot be
    /// parsed is logged and discarded rather than propagated, so a
    /// corrupt file degrades to a cold start instead of a crash.
    pub fn load(&self) -> Result<Option<PersistedState>> {
        let Some(raw) = self.storage.get(&self.key)? else {
            return Ok(None);
        };

        let envelope: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("persisted state is not valid JSON, discarding: {}", e);
                return Ok(None);
            }
        };

        let version = envelope
            .get("version")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        let Some(state) = envelope.get("state").cloned() else {
            tracing::warn!("persisted envelope has no state, discarding");
            return Ok(None);
        };

        let Some(migrated) = migrate(version, state) else {
            return Ok(None);
        };

        match serde_json::from_value::<PersistedState>(migrated) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!("persisted state does not match schema, discarding: {}", e);
                Ok(None)
            }
        }
    }

    /// Drop the stored snapshot.
    pub fn reset(&self) -> Result<()> {
        self.storage.remove(&self.key)
    }
}
