//! Portal bootstrapping.
//!
//! `PortalRuntime` wires one portal's store, bus subscription, and sync
//! engine together. Construction does no I/O; [`attach`] performs the
//! observable startup sequence: mark connectivity, hydrate persisted
//! state, start listening for sibling messages, and start the periodic
//! drain timer. [`detach`] (also run on drop) tears all of it down.
//!
//! [`attach`]: PortalRuntime::attach
//! [`detach`]: PortalRuntime::detach

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::channel::dispatch::apply_message;
use crate::channel::{PortalBus, SubscriptionId};
use crate::config::MIN_INTERVAL_SECONDS;
use crate::core::action::{Action, SyncAction};
use crate::core::store::StateStore;
use crate::sync::SyncEngine;

/// One portal's assembled runtime.
pub struct PortalRuntime {
    store: Arc<StateStore>,
    engine: Arc<SyncEngine>,
    bus: Arc<dyn PortalBus>,
    subscription: Mutex<Option<SubscriptionId>>,
    stop: Arc<AtomicBool>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl PortalRuntime {
    /// Assemble a runtime. Nothing starts until [`attach`](Self::attach).
    pub fn new(store: Arc<StateStore>, engine: Arc<SyncEngine>, bus: Arc<dyn PortalBus>) -> Self {
        Self {
            store,
            engine,
            bus,
            subscription: Mutex::new(None),
            stop: Arc::new(AtomicBool::new(false)),
            timer: Mutex::new(None),
        }
    }

    /// The store this runtime drives.
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Start the portal.
    ///
    /// Records initial connectivity, hydrates persisted state, subscribes
    /// to the bus, and starts the periodic drain timer. Returns whether a
    /// persisted snapshot was found. Calling attach twice is a no-op.
    pub fn attach(&self, initial_online: bool) -> bool {
        {
            let mut subscription = self.subscription.lock().unwrap();
            if subscription.is_some() {
                tracing::debug!("portal {} already attached", self.store.portal_id());
                return self.store.is_hydrated();
            }

            self.store
                .dispatch(Action::Sync(SyncAction::SetOnline(initial_online)));

            let store = self.store.clone();
            let engine = self.engine.clone();
            let id = self.bus.subscribe(
                self.store.portal_id().clone(),
                Arc::new(move |message| {
                    if apply_message(&store, message) {
                        engine.drain();
                    }
                }),
            );
            *subscription = Some(id);
        }

        let found = self.store.hydrate();
        self.start_timer();

        tracing::info!(
            "portal {} attached (snapshot: {})",
            self.store.portal_id(),
            if found { "restored" } else { "cold start" }
        );
        found
    }

    /// Record a connectivity change. Coming back online triggers an
    /// immediate drain of the offline queue.
    pub fn notify_connectivity(&self, online: bool) {
        let was_online = self.store.snapshot().sync.status.is_online;
        self.store
            .dispatch(Action::Sync(SyncAction::SetOnline(online)));

        if online && !was_online {
            tracing::info!("portal {} back online, draining queue", self.store.portal_id());
            self.engine.drain();
        }
    }

    /// Drain the offline queue now.
    pub fn drain_now(&self) -> crate::sync::DrainOutcome {
        self.engine.drain()
    }

    /// Stop the timer and unsubscribe from the bus. Safe to call twice.
    pub fn detach(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.timer.lock().unwrap().take() {
            let _ = handle.join();
        }

        if let Some(id) = self.subscription.lock().unwrap().take() {
            self.bus.unsubscribe(id);
        }
    }

    fn start_timer(&self) {
        let configured = self.store.config().sync.interval_seconds;
        let interval = configured.max(MIN_INTERVAL_SECONDS);
        if interval != configured {
            tracing::warn!(
                "sync interval {}s below minimum, using {}s",
                configured,
                interval
            );
        }

        self.stop.store(false, Ordering::SeqCst);
        let stop = self.stop.clone();
        let engine = self.engine.clone();

        let handle = std::thread::spawn(move || {
            // Sleep in short steps so detach never waits out a full
            // interval.
            let step = Duration::from_millis(100);
            let steps_per_interval = interval as u64 * 10;
            loop {
                for _ in 0..steps_per_interval {
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    std::thread::sleep(step);
                }
                engine.drain();
            }
        });
        *self.timer.lock().unwrap() = Some(handle);
    }
}

impl Drop for PortalRuntime {
    fn drop(&mut self) {
        self.detach();
    }
}
