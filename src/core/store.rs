//! The state container.
//!
//! `StateStore` holds one [`AppState`] tree behind a lock and funnels all
//! mutation through [`reduce`]. After each dispatch it persists the tree
//! (fail-open), notifies local subscribers, and broadcasts
//! identity-relevant changes to sibling portals over the bus.
//!
//! Remote changes enter through [`StateStore::apply_remote`], which runs
//! the same reducer but never re-broadcasts, so two stores wired to one
//! bus cannot echo messages back and forth.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::channel::{MessagePayload, PortalBus, PortalId, PortalMessage};
use crate::config::Config;
use crate::core::action::{Action, AuthAction, StudentAction};
use crate::core::reducer::reduce;
use crate::core::state::AppState;
use crate::error::FailOpen;
use crate::persist::Persistence;

/// Handle returned by [`StateStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Subscriber = Arc<dyn Fn(&AppState) + Send + Sync>;

/// Per-portal state container.
pub struct StateStore {
    state: RwLock<AppState>,
    config: Config,
    portal: PortalId,
    persistence: Option<Persistence>,
    bus: Option<Arc<dyn PortalBus>>,
    subscribers: Mutex<Vec<(SubscriberId, Subscriber)>>,
    next_subscriber: AtomicU64,
    hydrated: AtomicBool,
}

impl StateStore {
    /// Create a store for a portal with the initial tree.
    pub fn new(portal: PortalId, config: Config) -> Self {
        Self {
            state: RwLock::new(AppState::initial()),
            config,
            portal,
            persistence: None,
            bus: None,
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(0),
            hydrated: AtomicBool::new(false),
        }
    }

    /// Attach write-through persistence.
    pub fn with_persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Attach the cross-portal bus.
    pub fn with_bus(mut self, bus: Arc<dyn PortalBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// The portal this store belongs to.
    pub fn portal_id(&self) -> &PortalId {
        &self.portal
    }

    /// The configuration the reducer runs with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A clone of the current tree.
    pub fn snapshot(&self) -> AppState {
        self.state.read().unwrap().clone()
    }

    /// Dispatch a local action.
    ///
    /// Reduces, persists (fail-open), notifies subscribers, and
    /// broadcasts identity-relevant changes to sibling portals.
    pub fn dispatch(&self, action: Action) {
        let next = self.transition(&action);

        if action.broadcast_relevant() {
            self.broadcast(&action, &next);
        }
    }

    /// Apply an action that originated on a sibling portal.
    ///
    /// Identical to [`dispatch`](Self::dispatch) except it never
    /// re-broadcasts.
    pub fn apply_remote(&self, action: Action) {
        self.transition(&action);
    }

    fn transition(&self, action: &Action) -> AppState {
        let next = {
            let mut state = self.state.write().unwrap();
            let next = reduce(&state, action, &self.config);
            *state = next.clone();
            next
        };

        if let Some(persistence) = &self.persistence {
            persistence.save(&next).fail_open_default("persisting state");
        }

        self.notify(&next);
        next
    }

    fn notify(&self, state: &AppState) {
        let subscribers: Vec<Subscriber> = {
            let subscribers = self.subscribers.lock().unwrap();
            subscribers.iter().map(|(_, s)| s.clone()).collect()
        };
        for subscriber in subscribers {
            subscriber(state);
        }
    }

    fn broadcast(&self, action: &Action, state: &AppState) {
        let Some(bus) = &self.bus else { return };

        let payload = match action {
            Action::Logout => MessagePayload::Logout,
            // A cleared user is not an identity update; sign-out travels
            // as `Logout`.
            Action::Auth(AuthAction::SetUser(Some(user))) => MessagePayload::UserUpdated {
                user: user.clone(),
            },
            Action::Auth(AuthAction::SetUser(None)) => return,
            Action::Students(StudentAction::AddStudent(student)) => {
                MessagePayload::StudentUpdated {
                    student: student.clone(),
                }
            }
            Action::Students(StudentAction::UpdateStudent { id, .. }) => {
                match state.students.profiles.get(id) {
                    Some(student) => MessagePayload::StudentUpdated {
                        student: student.clone(),
                    },
                    // Patch hit an unknown id; nothing changed, nothing to say.
                    None => return,
                }
            }
            _ => return,
        };

        let mut message = PortalMessage::new(payload, self.portal.clone());
        if let Some(user) = &state.auth.current_user {
            message = message.with_user(&user.id);
        }
        bus.publish(message);
    }

    /// Register a subscriber called with the tree after every transition.
    pub fn subscribe(&self, subscriber: Subscriber) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber.fetch_add(1, Ordering::SeqCst));
        self.subscribers.lock().unwrap().push((id, subscriber));
        id
    }

    /// Remove a subscriber. Unknown ids are a no-op.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.lock().unwrap().retain(|(s, _)| *s != id);
    }

    /// Merge the persisted snapshot into the tree and mark the store
    /// hydrated. Returns whether a snapshot was found.
    ///
    /// Hydration is fail-open: storage errors and corrupt snapshots log
    /// a warning and leave the initial tree in place.
    pub fn hydrate(&self) -> bool {
        let loaded = match &self.persistence {
            Some(persistence) => persistence
                .load()
                .fail_open_default("loading persisted state"),
            None => None,
        };

        let found = loaded.is_some();
        if let Some(snapshot) = loaded {
            let next = {
                let mut state = self.state.write().unwrap();
                snapshot.apply_to(&mut state);
                state.clone()
            };
            self.notify(&next);
        }

        self.hydrated.store(true, Ordering::SeqCst);
        found
    }

    /// Whether [`hydrate`](Self::hydrate) has completed.
    pub fn is_hydrated(&self) -> bool {
        self.hydrated.load(Ordering::SeqCst)
    }

    /// Serialize the full tree for export.
    pub fn export_state(&self) -> String {
        let state = self.state.read().unwrap();
        // The tree serializes infallibly: no maps with non-string keys,
        // no non-finite floats introduced by the reducer.
        serde_json::to_string_pretty(&*state).unwrap_or_else(|_| "{}".to_string())
    }

    /// Replace the full tree from an export. Returns whether the import
    /// was applied; malformed input logs a warning and changes nothing.
    ///
    /// Derived fields in the input are ignored and recomputed, so an
    /// import can never install a tree whose `is_authenticated` or
    /// pending/conflict counts disagree with their data.
    pub fn import_state(&self, json: &str) -> bool {
        let mut imported: AppState = match serde_json::from_str(json) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("rejecting state import, not a valid tree: {}", e);
                return false;
            }
        };
        crate::core::reducer::normalize(&mut imported);

        let next = {
            let mut state = self.state.write().unwrap();
            *state = imported;
            state.clone()
        };

        if let Some(persistence) = &self.persistence {
            persistence.save(&next).fail_open_default("persisting state");
        }
        self.notify(&next);
        true
    }
}
