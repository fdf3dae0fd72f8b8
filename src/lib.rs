//! Atrium - Cross-portal state synchronization engine
//!
//! Atrium keeps a family of portal applications (parent, teacher,
//! student, assessment, district, admin) in agreement about shared
//! state. Each portal holds its own [`StateStore`]; identity and shared
//! entity changes are broadcast over an origin-scoped [`PortalBus`],
//! durable slices are persisted through tiered storage, and mutations
//! made offline queue up for replay by the [`SyncEngine`] when
//! connectivity returns.

pub mod channel;
pub mod config;
pub mod core;
pub mod error;
pub mod persist;
pub mod portal;
pub mod storage;
pub mod sync;
pub mod util;

pub use channel::{
    apply_message, LocalBus, MessageHandler, MessagePayload, PortalBus, PortalId, PortalMessage,
    SubscriptionId,
};
pub use config::Config;
pub use core::{
    Action, AppState, AuthAction, LearningAction, PortalAction, StateStore, StudentAction,
    SubscriberId, SyncAction, UiAction,
};
pub use error::{AtriumError, FailOpen, Result};
pub use persist::{Persistence, PersistedPayload, PersistedState, PERSIST_SCHEMA_VERSION};
pub use portal::PortalRuntime;
pub use storage::{
    FileStorage, FlatStorage, MemoryStorage, StorageAdapter, StorageUsage, TieredStorage,
};
pub use sync::{DrainOutcome, SyncBackend, SyncEngine};
