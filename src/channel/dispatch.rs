//! Mapping inbound bus messages onto store actions.
//!
//! `apply_message` is the receive side of cross-portal sync: it turns a
//! [`PortalMessage`] into the matching [`Action`] and applies it through
//! [`StateStore::apply_remote`], which never re-broadcasts. Unknown
//! message kinds land in the receiving portal's scratch area, keyed by
//! message kind, rather than being dropped.

use serde_json::json;

use crate::channel::{MessagePayload, PortalMessage};
use crate::core::action::{Action, AuthAction, PortalAction, StudentAction};
use crate::core::store::StateStore;

/// Apply an inbound message to a store.
///
/// Returns `true` when the message asks this portal to drain its offline
/// queue (`SYNC_REQUEST`); the caller decides whether and how to run the
/// sync engine.
pub fn apply_message(store: &StateStore, message: &PortalMessage) -> bool {
    // Targeted messages addressed elsewhere are ignored even if a bus
    // delivered them here.
    if let Some(target) = &message.target_portal {
        if target != store.portal_id() {
            return false;
        }
    }

    match &message.payload {
        MessagePayload::UserUpdated { user } => {
            store.apply_remote(Action::Auth(AuthAction::SetUser(Some(user.clone()))));
        }
        MessagePayload::StudentUpdated { student } => {
            store.apply_remote(Action::Students(StudentAction::AddStudent(student.clone())));
        }
        MessagePayload::Logout => {
            store.apply_remote(Action::Logout);
        }
        MessagePayload::SyncRequest => return true,
        // The payload is stored under its kind rather than merged bare,
        // so two unrelated extension kinds from one portal cannot
        // clobber each other's keys in the scratch blob.
        MessagePayload::Extension { kind, data } => {
            tracing::debug!(
                "stashing unrecognized '{}' message from {}",
                kind,
                message.source_portal
            );
            store.apply_remote(Action::Portals(PortalAction::MergePortalState {
                portal: message.source_portal.clone(),
                data: json!({ kind.clone(): data.clone() }),
            }));
        }
    }

    false
}
