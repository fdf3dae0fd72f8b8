//! In-process broadcast bus.
//!
//! `LocalBus` is the origin-scoped bus for portals hosted in one process
//! (and the test double for the real browser channel). Listeners are
//! plain callbacks; `publish` snapshots the listener list and invokes
//! handlers outside the lock, so a handler may publish follow-up messages
//! without deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::channel::{MessageHandler, PortalBus, PortalId, PortalMessage, SubscriptionId};

struct Subscription {
    id: SubscriptionId,
    portal: PortalId,
    handler: MessageHandler,
}

/// In-process implementation of [`PortalBus`].
///
/// Delivery skips listeners registered under the sender's own portal,
/// mirroring the browser broadcast channel's "everyone but me" semantics
/// and preventing echo loops.
#[derive(Default)]
pub struct LocalBus {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl LocalBus {
    /// Create a new empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }
}

impl PortalBus for LocalBus {
    fn publish(&self, message: PortalMessage) {
        let handlers: Vec<MessageHandler> = {
            let subscriptions = self.subscriptions.lock().unwrap();
            subscriptions
                .iter()
                .filter(|sub| sub.portal != message.source_portal)
                .filter(|sub| {
                    message
                        .target_portal
                        .as_ref()
                        .map(|target| *target == sub.portal)
                        .unwrap_or(true)
                })
                .map(|sub| sub.handler.clone())
                .collect()
        };

        tracing::debug!(
            "publishing {} from {} to {} listener(s)",
            message.payload.kind(),
            message.source_portal,
            handlers.len()
        );

        for handler in handlers {
            handler(&message);
        }
    }

    fn subscribe(&self, portal: PortalId, handler: MessageHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscriptions.lock().unwrap().push(Subscription {
            id,
            portal,
            handler,
        });
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.lock().unwrap().retain(|sub| sub.id != id);
    }
}
