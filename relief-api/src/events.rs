//! WebSocket Event Types
//!
//! Outbound frames are `{"event": <type>, "data": <payload>, "timestamp"}`.
//! Inbound frames are `{"event": <type>, "data": <payload>}` and are routed
//! by [`InboundRouter`](crate::broadcaster::InboundRouter).

use relief_core::{Disaster, EntityId, Resource, SocialMediaReport, Timestamp, Urgency};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Identifies one live connection for its lifetime.
pub type ObserverId = Uuid;

// ============================================================================
// EVENT NAMES
// ============================================================================

pub const JOIN_DISASTER: &str = "join_disaster";
pub const LEAVE_DISASTER: &str = "leave_disaster";
pub const SUBSCRIBE_UPDATES: &str = "subscribe_updates";
pub const UNSUBSCRIBE_UPDATES: &str = "unsubscribe_updates";
pub const UPDATE_LOCATION: &str = "update_location";
pub const PRIORITY_ALERT: &str = "priority_alert";

/// Status string carried by every heartbeat.
pub const STATUS_OPERATIONAL: &str = "operational";

// ============================================================================
// OUTBOUND EVENTS
// ============================================================================

/// Lifecycle change of a disaster record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum DisasterChange {
    Create { disaster: Disaster },
    Update { disaster: Disaster },
    Delete { disaster_id: EntityId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceAction {
    Create,
}

/// Events pushed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum WsEvent {
    /// First frame on every connection.
    Connected { observer_id: ObserverId },

    DisasterUpdated(DisasterChange),

    ResourcesUpdated {
        action: ResourceAction,
        disaster_id: EntityId,
        resource: Resource,
    },

    SocialMediaUpdated {
        disaster_id: String,
        reports: Vec<SocialMediaReport>,
        source: String,
    },

    ResponderLocationUpdated {
        user_id: String,
        lat: f64,
        lng: f64,
        timestamp: Timestamp,
    },

    PriorityAlertReceived {
        disaster_id: String,
        message: String,
        urgency: Urgency,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
        timestamp: Timestamp,
    },

    /// Periodic heartbeat.
    SystemStatus {
        timestamp: Timestamp,
        connected_clients: usize,
        status: String,
    },

    Error { message: String },
}

impl WsEvent {
    /// Wire name of the event.
    pub fn event_type(&self) -> &'static str {
        match self {
            WsEvent::Connected { .. } => "connected",
            WsEvent::DisasterUpdated(_) => "disaster_updated",
            WsEvent::ResourcesUpdated { .. } => "resources_updated",
            WsEvent::SocialMediaUpdated { .. } => "social_media_updated",
            WsEvent::ResponderLocationUpdated { .. } => "responder_location_updated",
            WsEvent::PriorityAlertReceived { .. } => "priority_alert_received",
            WsEvent::SystemStatus { .. } => "system_status",
            WsEvent::Error { .. } => "error",
        }
    }
}

/// An event as it goes over the wire, stamped at publish time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    #[serde(flatten)]
    pub event: WsEvent,
    pub timestamp: Timestamp,
}

impl OutboundFrame {
    pub fn new(event: WsEvent, timestamp: Timestamp) -> Self {
        Self { event, timestamp }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// INBOUND EVENTS
// ============================================================================

/// A frame sent by an observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    pub event: String,
    #[serde(default)]
    pub data: JsonValue,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Payload of `update_location`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocationUpdate {
    #[serde(deserialize_with = "id_string")]
    pub disaster_id: String,
    pub lat: f64,
    pub lng: f64,
    pub user_id: String,
}

fn medium() -> Urgency {
    Urgency::Medium
}

/// Payload of `priority_alert`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriorityAlert {
    #[serde(deserialize_with = "id_string")]
    pub disaster_id: String,
    pub message: String,
    #[serde(default = "medium")]
    pub urgency: Urgency,
    #[serde(default)]
    pub location: Option<String>,
}

/// Disaster ids arrive as strings or numbers depending on the client.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    disaster_id_from(&value).ok_or_else(|| serde::de::Error::custom("expected a disaster id"))
}

/// Accepts `"id"`, `42`, or `{"disaster_id": ...}`.
pub fn disaster_id_from(data: &JsonValue) -> Option<String> {
    match data {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Object(map) => map.get("disaster_id").and_then(disaster_id_from),
        _ => None,
    }
}
