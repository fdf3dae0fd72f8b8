//! Offline action queue replay.
//!
//! While a portal is offline, mutation intents accumulate in the state
//! tree as [`OfflineAction`](crate::core::state::OfflineAction)s. When
//! connectivity returns, [`SyncEngine`] drains the queue through a
//! [`SyncBackend`], spending each action's retry budget and dead-lettering
//! what the backend will not take.

pub mod backend;
pub mod engine;

pub use backend::SyncBackend;
pub use engine::{DrainOutcome, SyncEngine};
