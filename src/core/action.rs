//! Mutation actions for the state tree.
//!
//! One sub-enum per slice, composed into a single `Action` type consumed
//! by the reducer. Actions are data; dispatching one never fails. Inputs
//! that don't apply (unknown student id, ending a session when none is
//! active, patching preferences with no user) reduce to a no-op.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::channel::PortalId;
use crate::core::state::{
    ActivityRecord, Conflict, LearningSession, Notification, OfflineAction, PreferencesPatch,
    StudentPatch, StudentProfile, Theme, UserRecord,
};

/// A mutation of the state tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Auth(AuthAction),
    Students(StudentAction),
    Learning(LearningAction),
    Portals(PortalAction),
    Sync(SyncAction),
    Ui(UiAction),
    /// Cross-slice sign-out: resets auth, clears the roster, the active
    /// session and archive, and drains the offline queue.
    Logout,
    /// Restore the entire tree to its initial value.
    Reset,
}

/// Auth slice mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthAction {
    /// Replace the signed-in user. `is_authenticated` is derived from it.
    SetUser(Option<UserRecord>),
    /// Replace the credential; setting one also stamps `session_expiry`.
    SetToken(Option<String>),
    /// Deep-merge a partial preferences patch. No-op without a user.
    UpdatePreferences(PreferencesPatch),
}

/// Students slice mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum StudentAction {
    /// Insert or replace a profile.
    AddStudent(StudentProfile),
    /// Patch an existing profile. Unknown ids are a no-op.
    UpdateStudent { id: String, patch: StudentPatch },
    /// Remove a profile; clears `active_student_id` if it pointed here.
    RemoveStudent { id: String },
    /// Point at a profile. Unknown ids are a no-op.
    SetActiveStudent(Option<String>),
    /// Flip a named loading flag.
    SetLoading { key: String, value: bool },
}

/// Learning slice mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum LearningAction {
    /// Begin a session, replacing any active one.
    StartSession(LearningSession),
    /// Touch the active session. No-op when none is active.
    UpdateSession {
        focus_score: Option<f64>,
        break_count: Option<u32>,
    },
    /// Archive the active session onto `recent_activities` and clear it.
    /// No-op when none is active.
    EndSession,
    /// Prepend an activity record, truncating to the cap.
    AddActivity(ActivityRecord),
}

/// Portal scratch-area mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum PortalAction {
    /// Deep-merge a blob into `portals[portal]`.
    MergePortalState { portal: PortalId, data: Value },
    /// Drop a portal's scratch blob.
    ClearPortalState { portal: PortalId },
}

/// Sync slice mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    SetOnline(bool),
    SetSyncing(bool),
    /// Append to the offline queue; `pending_actions` tracks the length.
    AddOfflineAction(OfflineAction),
    /// Remove a queued action by id (successful replay).
    RemoveOfflineAction { id: String },
    /// Bump a queued action's retry counter after a failed replay.
    IncrementRetry { id: String },
    /// Record a detected conflict.
    RecordConflict(Conflict),
    ClearConflicts,
    StampLastSync(DateTime<Utc>),
}

/// UI slice mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    SetTheme(Theme),
    SetSidebarOpen(bool),
    /// Prepend a notification, truncating to the cap.
    AddNotification(Notification),
    RemoveNotification { id: String },
    ClearNotifications,
    OpenModal { id: String, data: Value },
    CloseModal { id: String },
}

impl Action {
    /// Whether this action represents an identity or shared-entity change
    /// that should be broadcast to sibling portals.
    pub fn broadcast_relevant(&self) -> bool {
        matches!(
            self,
            Action::Logout
                | Action::Auth(AuthAction::SetUser(_))
                | Action::Students(StudentAction::AddStudent(_))
                | Action::Students(StudentAction::UpdateStudent { .. })
        )
    }
}
