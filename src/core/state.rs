//! The replicated state tree shared by every portal process.
//!
//! One `AppState` instance exists per portal process; all portals on the
//! same origin converge on the same logical tree through the broadcast
//! channel and the shared storage namespace. Field names serialize as
//! camelCase to match the documented persisted-record and wire shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::channel::PortalId;
use crate::util::deep_merge;

/// Root state tree.
///
/// Composed of independent slices that share one notification mechanism.
/// Mutation happens only through the reducer; see [`crate::core::reducer`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AppState {
    /// Session identity slice.
    pub auth: AuthState,
    /// Student roster slice.
    pub students: StudentsState,
    /// Active learning session slice.
    pub learning: LearningState,
    /// Per-portal opaque scratch blobs; no cross-validation is performed.
    pub portals: HashMap<String, Value>,
    /// Offline queue and sync status slice.
    pub sync: SyncState,
    /// Ephemeral UI slice.
    pub ui: UiState,
}

impl AppState {
    /// The fixed initial tree every store starts from.
    pub fn initial() -> Self {
        Self::default()
    }
}

/// Session identity state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthState {
    /// The signed-in user, if any.
    pub current_user: Option<UserRecord>,
    /// Credential for the backend. Never persisted.
    pub token: Option<String>,
    /// Derived: always `current_user.is_some()`. Never set directly.
    pub is_authenticated: bool,
    /// Set whenever a token is set; `now + config.session.expiry_hours`.
    pub session_expiry: Option<DateTime<Utc>>,
}

/// An identity record for the signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Stable user identifier.
    pub id: String,
    /// Which portal population this user belongs to.
    pub role: UserRole,
    /// Display name.
    pub name: String,
    /// Contact email, if known.
    pub email: Option<String>,
    /// User preferences; patched via deep merge.
    pub preferences: UserPreferences,
}

impl UserRecord {
    /// Create a new user record with default preferences.
    pub fn new(id: impl Into<String>, role: UserRole, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            name: name.into(),
            email: None,
            preferences: UserPreferences::default(),
        }
    }

    /// Set the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Role of the signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Parent,
    Teacher,
    Student,
    Assessment,
    District,
    SuperAdmin,
}

/// User preferences.
///
/// `extra` is the free-form remainder; it is deep-merged on patch so
/// portals can stash nested settings without schema changes here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
    /// BCP-47 language tag.
    pub language: String,
    /// Preferred color theme.
    pub theme: Theme,
    /// Whether in-app notifications are enabled.
    pub notifications_enabled: bool,
    /// Free-form extension settings.
    pub extra: Value,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            theme: Theme::System,
            notifications_enabled: true,
            extra: Value::Null,
        }
    }
}

/// Partial preferences update.
///
/// `None` fields are left untouched; `extra` is deep-merged rather than
/// replaced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PreferencesPatch {
    pub language: Option<String>,
    pub theme: Option<Theme>,
    pub notifications_enabled: Option<bool>,
    pub extra: Option<Value>,
}

impl UserPreferences {
    /// Apply a partial patch, deep-merging the free-form `extra` value.
    pub fn apply(&mut self, patch: &PreferencesPatch) {
        if let Some(language) = &patch.language {
            self.language = language.clone();
        }
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
        if let Some(enabled) = patch.notifications_enabled {
            self.notifications_enabled = enabled;
        }
        if let Some(extra) = &patch.extra {
            self.extra = deep_merge(&self.extra, extra);
        }
    }
}

/// Color theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Student roster state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentsState {
    /// Student id to profile.
    pub profiles: HashMap<String, StudentProfile>,
    /// If non-null, must key an entry in `profiles`.
    pub active_student_id: Option<String>,
    /// Arbitrary key to spinner flag, for UI loading indicators.
    pub loading_states: HashMap<String, bool>,
}

/// A student record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub id: String,
    pub name: String,
    pub grade: String,
    /// Learning-progress summary.
    pub progress: LearningProgress,
    /// Optional baseline assessment data (opaque to this core).
    pub baseline: Option<Value>,
    /// Optional personalization data (opaque to this core).
    pub personalization: Option<Value>,
}

impl StudentProfile {
    /// Create a new student profile with empty progress.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        grade: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            grade: grade.into(),
            progress: LearningProgress::default(),
            baseline: None,
            personalization: None,
        }
    }
}

/// Partial student update. `None` fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub grade: Option<String>,
    pub progress: Option<LearningProgress>,
    pub baseline: Option<Value>,
    pub personalization: Option<Value>,
}

impl StudentProfile {
    /// Apply a partial patch.
    pub fn apply(&mut self, patch: &StudentPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(grade) = &patch.grade {
            self.grade = grade.clone();
        }
        if let Some(progress) = &patch.progress {
            self.progress = progress.clone();
        }
        if let Some(baseline) = &patch.baseline {
            self.baseline = Some(baseline.clone());
        }
        if let Some(personalization) = &patch.personalization {
            self.personalization = Some(personalization.clone());
        }
    }
}

/// Learning-progress summary for a student.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LearningProgress {
    pub sessions_completed: u32,
    pub total_minutes: u32,
    pub mastery: f64,
}

/// Learning session state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LearningState {
    /// The active session, if any.
    pub current_session: Option<LearningSession>,
    /// Archived sessions/activities, most recent first, length-capped.
    pub recent_activities: Vec<ActivityRecord>,
}

/// An active learning session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LearningSession {
    pub id: String,
    pub student_id: String,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub focus_score: f64,
    pub break_count: u32,
}

impl LearningSession {
    /// Start a new session now.
    pub fn new(id: impl Into<String>, student_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            student_id: student_id.into(),
            started_at: now,
            last_activity_at: now,
            focus_score: 0.0,
            break_count: 0,
        }
    }
}

/// Kind of an archived activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Session,
    Assessment,
    Practice,
    Break,
}

/// An archived session or activity record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: String,
    pub student_id: String,
    pub kind: ActivityKind,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub focus_score: f64,
    pub break_count: u32,
}

impl ActivityRecord {
    /// Archive a session with the given end timestamp.
    pub fn from_session(session: &LearningSession, ended_at: DateTime<Utc>) -> Self {
        Self {
            id: session.id.clone(),
            student_id: session.student_id.clone(),
            kind: ActivityKind::Session,
            started_at: session.started_at,
            ended_at,
            focus_score: session.focus_score,
            break_count: session.break_count,
        }
    }
}

/// Offline queue and sync status state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncState {
    /// Status summary consumed by the UI layer.
    pub status: SyncStatus,
    /// Queued mutations awaiting replay against the backend.
    pub offline_actions: Vec<OfflineAction>,
    /// Detected but unresolved discrepancies (including dead-lettered
    /// offline actions).
    pub conflicts: Vec<Conflict>,
}

/// Sync status summary.
///
/// `pending_actions` and `conflicts_count` are derived from the queue and
/// conflict list lengths and are recomputed on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncStatus {
    pub is_online: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub pending_actions: usize,
    pub conflicts_count: usize,
    pub is_syncing: bool,
}

/// A queued mutation intent awaiting confirmation from the backend.
///
/// Each action carries its own retry budget, so different action kinds can
/// have different durability policies (a progress ping can be cheap, a
/// consent submission durable).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OfflineAction {
    pub id: String,
    #[serde(flatten)]
    pub payload: OfflinePayload,
    /// Which portal queued the action.
    pub portal: PortalId,
    pub queued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl OfflineAction {
    /// Queue a new action now with the given retry budget.
    pub fn new(
        id: impl Into<String>,
        payload: OfflinePayload,
        portal: PortalId,
        max_retries: u32,
    ) -> Self {
        Self {
            id: id.into(),
            payload,
            portal,
            queued_at: Utc::now(),
            retry_count: 0,
            max_retries,
        }
    }

    /// Whether the retry budget is exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Payload of an offline action.
///
/// Known kinds get typed variants; anything else travels through
/// `Extension` as an opaque payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfflinePayload {
    /// Lightweight heartbeat carrying the current focus score.
    ProgressPing {
        #[serde(rename = "studentId")]
        student_id: String,
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "focusScore")]
        focus_score: f64,
    },
    /// A completed activity to report upstream.
    ActivityReport { activity: ActivityRecord },
    /// A preference change made while offline.
    PreferenceChange { patch: PreferencesPatch },
    /// A consent decision; typically gets a generous retry budget.
    ConsentSubmission {
        #[serde(rename = "studentId")]
        student_id: String,
        #[serde(rename = "consentId")]
        consent_id: String,
        granted: bool,
    },
    /// Opaque extension payload for action kinds this core doesn't know.
    Extension { kind: String, data: Value },
}

/// Kind of a recorded conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// An offline action dropped after exhausting its retry budget.
    DeadLetter,
    /// Local and remote state disagree; resolution is future work.
    Divergence,
}

/// A detected but unresolved discrepancy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub id: String,
    pub kind: ConflictKind,
    pub detected_at: DateTime<Utc>,
    pub detail: String,
    /// The dropped action, for dead-letter conflicts.
    pub action: Option<OfflineAction>,
}

impl Conflict {
    /// Record a dead-lettered offline action.
    pub fn dead_letter(action: OfflineAction) -> Self {
        Self {
            id: format!("conflict-{}", action.id),
            kind: ConflictKind::DeadLetter,
            detected_at: Utc::now(),
            detail: format!(
                "offline action {} dropped after {} failed attempts",
                action.id, action.retry_count
            ),
            action: Some(action),
        }
    }

    /// Record a divergence between local and remote state.
    pub fn divergence(id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ConflictKind::Divergence,
            detected_at: Utc::now(),
            detail: detail.into(),
            action: None,
        }
    }
}

/// Ephemeral UI state. Notifications and modals are never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UiState {
    pub theme: Theme,
    pub sidebar_open: bool,
    /// Most recent first, length-capped.
    pub notifications: Vec<Notification>,
    pub modals: HashMap<String, ModalState>,
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient UI notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Create a new notification timestamped now.
    pub fn new(
        id: impl Into<String>,
        level: NotificationLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// State of a single modal dialog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModalState {
    pub is_open: bool,
    pub data: Value,
    pub opened_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initial_tree_is_empty() {
        let state = AppState::initial();

        assert!(state.auth.current_user.is_none());
        assert!(state.auth.token.is_none());
        assert!(!state.auth.is_authenticated);
        assert!(state.students.profiles.is_empty());
        assert!(state.students.active_student_id.is_none());
        assert!(state.learning.current_session.is_none());
        assert!(state.learning.recent_activities.is_empty());
        assert!(state.portals.is_empty());
        assert!(state.sync.offline_actions.is_empty());
        assert!(state.sync.conflicts.is_empty());
        assert_eq!(state.sync.status.pending_actions, 0);
        assert!(state.ui.notifications.is_empty());
        assert!(state.ui.modals.is_empty());
    }

    #[test]
    fn test_user_record_builder() {
        let user = UserRecord::new("u1", UserRole::Parent, "Pat")
            .with_email("pat@example.com");

        assert_eq!(user.id, "u1");
        assert_eq!(user.role, UserRole::Parent);
        assert_eq!(user.email, Some("pat@example.com".to_string()));
        assert_eq!(user.preferences.language, "en");
    }

    #[test]
    fn test_preferences_apply_patch() {
        let mut prefs = UserPreferences::default();
        prefs.extra = json!({"a": {"b": 1}, "keep": true});

        let patch = PreferencesPatch {
            language: Some("de".to_string()),
            theme: Some(Theme::Dark),
            notifications_enabled: None,
            extra: Some(json!({"a": {"c": 2}})),
        };

        prefs.apply(&patch);

        assert_eq!(prefs.language, "de");
        assert_eq!(prefs.theme, Theme::Dark);
        // Untouched field keeps its default
        assert!(prefs.notifications_enabled);
        // Deep merge: both b and c survive under "a"
        assert_eq!(prefs.extra, json!({"a": {"b": 1, "c": 2}, "keep": true}));
    }

    #[test]
    fn test_student_profile_apply_patch() {
        let mut student = StudentProfile::new("s1", "Ada", "3");

        let patch = StudentPatch {
            grade: Some("4".to_string()),
            progress: Some(LearningProgress {
                sessions_completed: 10,
                total_minutes: 240,
                mastery: 0.6,
            }),
            ..StudentPatch::default()
        };

        student.apply(&patch);

        assert_eq!(student.name, "Ada");
        assert_eq!(student.grade, "4");
        assert_eq!(student.progress.sessions_completed, 10);
    }

    #[test]
    fn test_activity_record_from_session() {
        let session = LearningSession::new("ls1", "s1");
        let ended = Utc::now();

        let record = ActivityRecord::from_session(&session, ended);

        assert_eq!(record.id, "ls1");
        assert_eq!(record.student_id, "s1");
        assert_eq!(record.kind, ActivityKind::Session);
        assert_eq!(record.started_at, session.started_at);
        assert_eq!(record.ended_at, ended);
    }

    #[test]
    fn test_offline_action_exhaustion() {
        let mut action = OfflineAction::new(
            "a1",
            OfflinePayload::ProgressPing {
                student_id: "s1".to_string(),
                session_id: "ls1".to_string(),
                focus_score: 0.8,
            },
            PortalId::Student,
            2,
        );

        assert!(!action.is_exhausted());
        action.retry_count = 1;
        assert!(!action.is_exhausted());
        action.retry_count = 2;
        assert!(action.is_exhausted());
    }

    #[test]
    fn test_dead_letter_conflict_keeps_action() {
        let mut action = OfflineAction::new(
            "a1",
            OfflinePayload::Extension {
                kind: "custom".to_string(),
                data: json!({"x": 1}),
            },
            PortalId::Teacher,
            3,
        );
        action.retry_count = 3;

        let conflict = Conflict::dead_letter(action.clone());

        assert_eq!(conflict.kind, ConflictKind::DeadLetter);
        assert_eq!(conflict.action, Some(action));
        assert!(conflict.detail.contains("a1"));
    }

    #[test]
    fn test_offline_payload_wire_shape() {
        let payload = OfflinePayload::ConsentSubmission {
            student_id: "s1".to_string(),
            consent_id: "c1".to_string(),
            granted: true,
        };

        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["type"], "CONSENT_SUBMISSION");
        assert_eq!(json["payload"]["studentId"], "s1");
        assert_eq!(json["payload"]["granted"], true);
    }

    #[test]
    fn test_offline_action_serialization_roundtrip() {
        let action = OfflineAction::new(
            "a1",
            OfflinePayload::ActivityReport {
                activity: ActivityRecord::from_session(
                    &LearningSession::new("ls1", "s1"),
                    Utc::now(),
                ),
            },
            PortalId::Parent,
            3,
        );

        let json = serde_json::to_string(&action).unwrap();
        let parsed: OfflineAction = serde_json::from_str(&json).unwrap();

        assert_eq!(action, parsed);
    }

    #[test]
    fn test_state_tree_serialization_uses_camel_case() {
        let state = AppState::initial();
        let json = serde_json::to_value(&state).unwrap();

        assert!(json["auth"].get("currentUser").is_some());
        assert!(json["auth"].get("isAuthenticated").is_some());
        assert!(json["students"].get("activeStudentId").is_some());
        assert!(json["learning"].get("recentActivities").is_some());
        assert!(json["sync"]["status"].get("pendingActions").is_some());
    }

    #[test]
    fn test_full_tree_roundtrip() {
        let mut state = AppState::initial();
        state.auth.current_user = Some(UserRecord::new("u1", UserRole::Teacher, "T"));
        state.auth.is_authenticated = true;
        state
            .students
            .profiles
            .insert("s1".to_string(), StudentProfile::new("s1", "Ada", "3"));
        state.students.active_student_id = Some("s1".to_string());
        state.learning.current_session = Some(LearningSession::new("ls1", "s1"));
        state
            .portals
            .insert("teacher".to_string(), json!({"view": "roster"}));
        state.sync.offline_actions.push(OfflineAction::new(
            "a1",
            OfflinePayload::ProgressPing {
                student_id: "s1".to_string(),
                session_id: "ls1".to_string(),
                focus_score: 0.5,
            },
            PortalId::Teacher,
            3,
        ));
        state
            .ui
            .notifications
            .push(Notification::new("n1", NotificationLevel::Info, "hi"));

        let json = serde_json::to_string_pretty(&state).unwrap();
        let parsed: AppState = serde_json::from_str(&json).unwrap();

        assert_eq!(state, parsed);
    }

    #[test]
    fn test_theme_serialization() {
        for theme in [Theme::Light, Theme::Dark, Theme::System] {
            let json = serde_json::to_string(&theme).unwrap();
            let parsed: Theme = serde_json::from_str(&json).unwrap();
            assert_eq!(theme, parsed);
        }
    }

    #[test]
    fn test_user_role_serialization() {
        let json = serde_json::to_string(&UserRole::SuperAdmin).unwrap();
        assert_eq!(json, "\"super_admin\"");
    }
}
