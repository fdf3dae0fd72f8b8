//! Cross-portal broadcast channel.
//!
//! Every portal process posts and listens on one origin-scoped bus. The
//! envelope serializes to the documented wire shape
//! `{ id, type, payload, sourcePortal, targetPortal?, timestamp, userId }`;
//! unknown message types decode to the `Extension` payload instead of
//! failing, so the channel doubles as a generic extensibility escape hatch.
//!
//! Delivery is fire-and-forget and at-most-once: a portal that is closed,
//! or whose listener has not yet attached, simply misses the message.
//! Messages from one sender reach each live listener in post order; there
//! is no cross-sender ordering and no replay log.

pub mod dispatch;
pub mod local;

pub use dispatch::apply_message;
pub use local::LocalBus;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::core::state::{StudentProfile, UserRecord};
use crate::util::generate_id;

/// Identity of a portal process.
///
/// Resolved from the process's own location; advisory metadata, not a
/// security boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PortalId {
    Parent,
    Teacher,
    Student,
    Assessment,
    District,
    SuperAdmin,
    /// A portal this core doesn't know by name.
    Other(String),
}

impl PortalId {
    /// Stable string form used on the wire and as the `portals` map key.
    pub fn as_str(&self) -> &str {
        match self {
            PortalId::Parent => "parent",
            PortalId::Teacher => "teacher",
            PortalId::Student => "student",
            PortalId::Assessment => "assessment",
            PortalId::District => "district",
            PortalId::SuperAdmin => "super_admin",
            PortalId::Other(name) => name,
        }
    }

    /// Resolve portal identity from the process's own location.
    ///
    /// Development uses the conventional port layout; production matches
    /// hostname substrings. Unrecognized locations become `Other(hostname)`.
    pub fn from_location(hostname: &str, port: Option<u16>) -> Self {
        let is_dev = hostname == "localhost" || hostname == "127.0.0.1";
        if is_dev {
            if let Some(port) = port {
                return match port {
                    3000 => PortalId::Parent,
                    3001 => PortalId::Teacher,
                    3002 => PortalId::Student,
                    3003 => PortalId::Assessment,
                    3004 => PortalId::District,
                    3005 => PortalId::SuperAdmin,
                    _ => PortalId::Other(format!("{}:{}", hostname, port)),
                };
            }
        }

        let host = hostname.to_ascii_lowercase();
        if host.contains("parent") {
            PortalId::Parent
        } else if host.contains("teacher") {
            PortalId::Teacher
        } else if host.contains("student") || host.contains("learn") {
            PortalId::Student
        } else if host.contains("assess") {
            PortalId::Assessment
        } else if host.contains("district") {
            PortalId::District
        } else if host.contains("admin") {
            PortalId::SuperAdmin
        } else {
            PortalId::Other(hostname.to_string())
        }
    }
}

impl From<String> for PortalId {
    fn from(value: String) -> Self {
        match value.as_str() {
            "parent" => PortalId::Parent,
            "teacher" => PortalId::Teacher,
            "student" => PortalId::Student,
            "assessment" => PortalId::Assessment,
            "district" => PortalId::District,
            "super_admin" => PortalId::SuperAdmin,
            _ => PortalId::Other(value),
        }
    }
}

impl From<PortalId> for String {
    fn from(value: PortalId) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for PortalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload of a cross-portal message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    /// The signed-in identity changed; siblings apply `SetUser`.
    UserUpdated { user: UserRecord },
    /// A shared student record changed; siblings upsert it.
    StudentUpdated { student: StudentProfile },
    /// Cross-portal forced sign-out.
    Logout,
    /// Ask siblings to drain their offline queues.
    SyncRequest,
    /// Anything else; merged verbatim into `portals[source_portal]`.
    Extension { kind: String, data: Value },
}

impl MessagePayload {
    /// The wire `type` string for this payload.
    pub fn kind(&self) -> String {
        match self {
            MessagePayload::UserUpdated { .. } => "USER_UPDATED".to_string(),
            MessagePayload::StudentUpdated { .. } => "STUDENT_UPDATED".to_string(),
            MessagePayload::Logout => "LOGOUT".to_string(),
            MessagePayload::SyncRequest => "SYNC_REQUEST".to_string(),
            MessagePayload::Extension { kind, .. } => kind.clone(),
        }
    }

    fn encode(&self) -> Value {
        match self {
            MessagePayload::UserUpdated { user } => {
                serde_json::json!({ "user": user })
            }
            MessagePayload::StudentUpdated { student } => {
                serde_json::json!({ "student": student })
            }
            MessagePayload::Logout | MessagePayload::SyncRequest => Value::Null,
            MessagePayload::Extension { data, .. } => data.clone(),
        }
    }

    /// Decode a wire type + payload pair.
    ///
    /// Known types with malformed payloads degrade to `Extension` with a
    /// warning rather than failing delivery.
    fn decode(kind: &str, payload: Value) -> Self {
        let fallback = |payload: Value| MessagePayload::Extension {
            kind: kind.to_string(),
            data: payload,
        };

        match kind {
            "USER_UPDATED" => {
                match serde_json::from_value::<UserRecord>(payload["user"].clone()) {
                    Ok(user) => MessagePayload::UserUpdated { user },
                    Err(err) => {
                        tracing::warn!("malformed USER_UPDATED payload: {}", err);
                        fallback(payload)
                    }
                }
            }
            "STUDENT_UPDATED" => {
                match serde_json::from_value::<StudentProfile>(payload["student"].clone()) {
                    Ok(student) => MessagePayload::StudentUpdated { student },
                    Err(err) => {
                        tracing::warn!("malformed STUDENT_UPDATED payload: {}", err);
                        fallback(payload)
                    }
                }
            }
            "LOGOUT" => MessagePayload::Logout,
            "SYNC_REQUEST" => MessagePayload::SyncRequest,
            _ => fallback(payload),
        }
    }
}

/// Envelope for a cross-portal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireMessage", from = "WireMessage")]
pub struct PortalMessage {
    pub id: String,
    pub payload: MessagePayload,
    pub source_portal: PortalId,
    /// If set, only the named portal should apply the message.
    pub target_portal: Option<PortalId>,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
}

impl PortalMessage {
    /// Create a new message from this portal, timestamped now.
    pub fn new(payload: MessagePayload, source_portal: PortalId) -> Self {
        Self {
            id: generate_id("msg"),
            payload,
            source_portal,
            target_portal: None,
            timestamp: Utc::now(),
            user_id: None,
        }
    }

    /// Address the message to a single portal.
    pub fn with_target(mut self, target: PortalId) -> Self {
        self.target_portal = Some(target);
        self
    }

    /// Attach the acting user's id.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// The documented wire shape of a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
    source_portal: PortalId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_portal: Option<PortalId>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    user_id: Option<String>,
}

impl From<PortalMessage> for WireMessage {
    fn from(message: PortalMessage) -> Self {
        Self {
            id: message.id,
            kind: message.payload.kind(),
            payload: message.payload.encode(),
            source_portal: message.source_portal,
            target_portal: message.target_portal,
            timestamp: message.timestamp,
            user_id: message.user_id,
        }
    }
}

impl From<WireMessage> for PortalMessage {
    fn from(wire: WireMessage) -> Self {
        Self {
            id: wire.id,
            payload: MessagePayload::decode(&wire.kind, wire.payload),
            source_portal: wire.source_portal,
            target_portal: wire.target_portal,
            timestamp: wire.timestamp,
            user_id: wire.user_id,
        }
    }
}

/// Handler invoked for each delivered message.
pub type MessageHandler = Arc<dyn Fn(&PortalMessage) + Send + Sync>;

/// Opaque handle returned by [`PortalBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// The origin-scoped publish/subscribe bus.
///
/// Publishing never blocks on or awaits receivers; a slow sibling portal
/// cannot stall the sender.
pub trait PortalBus: Send + Sync {
    /// Broadcast a message to every listener except those registered under
    /// the sender's own portal.
    fn publish(&self, message: PortalMessage);

    /// Register a listener for the given portal.
    fn subscribe(&self, portal: PortalId, handler: MessageHandler) -> SubscriptionId;

    /// Remove a listener. Unknown ids are a no-op.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Blanket implementation for Arc-wrapped buses.
impl<T: PortalBus + ?Sized> PortalBus for Arc<T> {
    fn publish(&self, message: PortalMessage) {
        (**self).publish(message)
    }

    fn subscribe(&self, portal: PortalId, handler: MessageHandler) -> SubscriptionId {
        (**self).subscribe(portal, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        (**self).unsubscribe(id)
    }
}
