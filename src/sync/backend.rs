//! Backend trait for replaying queued actions.

use std::sync::Arc;

use crate::core::state::OfflineAction;
use crate::error::Result;

/// Trait for the remote endpoint that queued actions are replayed to.
///
/// `submit` is synchronous and all-or-nothing per action: `Ok` confirms
/// the backend accepted the action, any `Err` counts as a failed attempt
/// against the action's retry budget.
pub trait SyncBackend: Send + Sync {
    /// Replay one queued action.
    fn submit(&self, action: &OfflineAction) -> Result<()>;
}

/// Blanket implementation of SyncBackend for Arc-wrapped backends.
impl<T: SyncBackend + ?Sized> SyncBackend for Arc<T> {
    fn submit(&self, action: &OfflineAction) -> Result<()> {
        (**self).submit(action)
    }
}
