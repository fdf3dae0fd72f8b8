//! Pure state transitions.
//!
//! `reduce` takes the current tree and an action and returns the next
//! tree; it performs no I/O and never fails. Derived fields
//! (`is_authenticated`, `pending_actions`, `conflicts_count`) are
//! normalized after every transition, so they can never drift from the
//! data they summarize.

use chrono::{Duration, Utc};

use crate::config::Config;
use crate::core::action::{
    Action, AuthAction, LearningAction, PortalAction, StudentAction, SyncAction, UiAction,
};
use crate::core::state::{ActivityRecord, AppState, AuthState};
use crate::util::deep_merge;

/// Compute the next tree for an action.
pub fn reduce(state: &AppState, action: &Action, config: &Config) -> AppState {
    let mut next = state.clone();

    match action {
        Action::Auth(action) => reduce_auth(&mut next, action, config),
        Action::Students(action) => reduce_students(&mut next, action),
        Action::Learning(action) => reduce_learning(&mut next, action, config),
        Action::Portals(action) => reduce_portals(&mut next, action),
        Action::Sync(action) => reduce_sync(&mut next, action),
        Action::Ui(action) => reduce_ui(&mut next, action, config),
        Action::Logout => reduce_logout(&mut next),
        Action::Reset => next = AppState::initial(),
    }

    normalize(&mut next);
    next
}

/// Recompute derived fields from the data they summarize.
///
/// Runs after every reduction; also applied to trees that enter from
/// outside the reducer (imports), which may carry derived fields that
/// disagree with their data.
pub fn normalize(state: &mut AppState) {
    state.auth.is_authenticated = state.auth.current_user.is_some();
    state.sync.status.pending_actions = state.sync.offline_actions.len();
    state.sync.status.conflicts_count = state.sync.conflicts.len();
}

fn reduce_auth(state: &mut AppState, action: &AuthAction, config: &Config) {
    match action {
        AuthAction::SetUser(user) => {
            state.auth.current_user = user.clone();
        }
        AuthAction::SetToken(token) => {
            state.auth.token = token.clone();
            state.auth.session_expiry = token
                .as_ref()
                .map(|_| Utc::now() + Duration::hours(config.session.expiry_hours));
        }
        AuthAction::UpdatePreferences(patch) => {
            // No current user: documented no-op
            if let Some(user) = state.auth.current_user.as_mut() {
                user.preferences.apply(patch);
            }
        }
    }
}

fn reduce_students(state: &mut AppState, action: &StudentAction) {
    match action {
        StudentAction::AddStudent(profile) => {
            state
                .students
                .profiles
                .insert(profile.id.clone(), profile.clone());
        }
        StudentAction::UpdateStudent { id, patch } => {
            // Unknown id: documented no-op
            if let Some(profile) = state.students.profiles.get_mut(id) {
                profile.apply(patch);
            }
        }
        StudentAction::RemoveStudent { id } => {
            state.students.profiles.remove(id);
            if state.students.active_student_id.as_deref() == Some(id) {
                state.students.active_student_id = None;
            }
        }
        StudentAction::SetActiveStudent(id) => match id {
            Some(id) if state.students.profiles.contains_key(id) => {
                state.students.active_student_id = Some(id.clone());
            }
            Some(_) => {} // unknown id: no-op, invariant preserved
            None => state.students.active_student_id = None,
        },
        StudentAction::SetLoading { key, value } => {
            state.students.loading_states.insert(key.clone(), *value);
        }
    }
}

fn reduce_learning(state: &mut AppState, action: &LearningAction, config: &Config) {
    match action {
        LearningAction::StartSession(session) => {
            state.learning.current_session = Some(session.clone());
        }
        LearningAction::UpdateSession {
            focus_score,
            break_count,
        } => {
            if let Some(session) = state.learning.current_session.as_mut() {
                if let Some(focus_score) = focus_score {
                    session.focus_score = *focus_score;
                }
                if let Some(break_count) = break_count {
                    session.break_count = *break_count;
                }
                session.last_activity_at = Utc::now();
            }
        }
        LearningAction::EndSession => {
            // No active session: documented no-op
            if let Some(session) = state.learning.current_session.take() {
                let record = ActivityRecord::from_session(&session, Utc::now());
                state.learning.recent_activities.insert(0, record);
                state
                    .learning
                    .recent_activities
                    .truncate(config.caps.session_archive);
            }
        }
        LearningAction::AddActivity(record) => {
            state.learning.recent_activities.insert(0, record.clone());
            state
                .learning
                .recent_activities
                .truncate(config.caps.recent_activities);
        }
    }
}

fn reduce_portals(state: &mut AppState, action: &PortalAction) {
    match action {
        PortalAction::MergePortalState { portal, data } => {
            let key = portal.as_str().to_string();
            let merged = match state.portals.get(&key) {
                Some(existing) => deep_merge(existing, data),
                None => data.clone(),
            };
            state.portals.insert(key, merged);
        }
        PortalAction::ClearPortalState { portal } => {
            state.portals.remove(portal.as_str());
        }
    }
}

fn reduce_sync(state: &mut AppState, action: &SyncAction) {
    match action {
        SyncAction::SetOnline(online) => state.sync.status.is_online = *online,
        SyncAction::SetSyncing(syncing) => state.sync.status.is_syncing = *syncing,
        SyncAction::AddOfflineAction(offline_action) => {
            state.sync.offline_actions.push(offline_action.clone());
        }
        SyncAction::RemoveOfflineAction { id } => {
            state.sync.offline_actions.retain(|a| a.id != *id);
        }
        SyncAction::IncrementRetry { id } => {
            if let Some(queued) = state.sync.offline_actions.iter_mut().find(|a| a.id == *id) {
                queued.retry_count += 1;
            }
        }
        SyncAction::RecordConflict(conflict) => {
            state.sync.conflicts.push(conflict.clone());
        }
        SyncAction::ClearConflicts => state.sync.conflicts.clear(),
        SyncAction::StampLastSync(at) => state.sync.status.last_sync_at = Some(*at),
    }
}

fn reduce_ui(state: &mut AppState, action: &UiAction, config: &Config) {
    match action {
        UiAction::SetTheme(theme) => state.ui.theme = *theme,
        UiAction::SetSidebarOpen(open) => state.ui.sidebar_open = *open,
        UiAction::AddNotification(notification) => {
            state.ui.notifications.insert(0, notification.clone());
            state.ui.notifications.truncate(config.caps.notifications);
        }
        UiAction::RemoveNotification { id } => {
            state.ui.notifications.retain(|n| n.id != *id);
        }
        UiAction::ClearNotifications => state.ui.notifications.clear(),
        UiAction::OpenModal { id, data } => {
            state.ui.modals.insert(
                id.clone(),
                crate::core::state::ModalState {
                    is_open: true,
                    data: data.clone(),
                    opened_at: Utc::now(),
                },
            );
        }
        UiAction::CloseModal { id } => {
            if let Some(modal) = state.ui.modals.get_mut(id) {
                modal.is_open = false;
            }
        }
    }
}

/// The one cross-slice action: reset auth, clear the roster, clear the
/// active session and archive, and drain the departing user's queue.
fn reduce_logout(state: &mut AppState) {
    state.auth = AuthState::default();
    state.students.profiles.clear();
    state.students.active_student_id = None;
    state.students.loading_states.clear();
    state.learning.current_session = None;
    state.learning.recent_activities.clear();
    state.sync.offline_actions.clear();
}
