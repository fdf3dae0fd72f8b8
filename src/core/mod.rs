//! Core state machinery: the tree, actions, the pure reducer, and the
//! store that ties them to persistence and the cross-portal bus.

pub mod action;
pub mod reducer;
pub mod state;
pub mod store;

pub use action::{
    Action, AuthAction, LearningAction, PortalAction, StudentAction, SyncAction, UiAction,
};
pub use reducer::{normalize, reduce};
pub use state::{
    ActivityKind, ActivityRecord, AppState, AuthState, Conflict, ConflictKind, LearningProgress,
    LearningSession, LearningState, ModalState, Notification, NotificationLevel, OfflineAction,
    OfflinePayload, PreferencesPatch, StudentPatch, StudentProfile, StudentsState, SyncState,
    SyncStatus, Theme, UiState, UserPreferences, UserRecord, UserRole,
};
pub use store::{StateStore, SubscriberId};
