//! Event types flowing from the Zigbee bridge to the host runtime.
//!
//! Devices never call into the host directly. Every observable change
//! (a property value, a button press, an action finishing) is published as a
//! `ZigbeeEvent` on the event bus and the host subscribes to what it needs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified event type for ZigMind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ZigbeeEvent {
    // ========== Bridge Events ==========
    /// The Zigbee2MQTT bridge reported its own state
    BridgeState { online: bool, timestamp: i64 },

    // ========== Device Lifecycle ==========
    /// A device was built from its definition
    DeviceAdded {
        device_id: String,
        title: String,
        categories: Vec<String>,
        timestamp: i64,
    },

    /// A device disappeared from the bridge device list
    DeviceRemoved { device_id: String, timestamp: i64 },

    /// Availability report from the bridge
    DeviceAvailability {
        device_id: String,
        available: bool,
        timestamp: i64,
    },

    // ========== Device State ==========
    /// A property's cached value changed
    PropertyChanged {
        device_id: String,
        property: String,
        value: serde_json::Value,
        timestamp: i64,
    },

    /// A device event (button press etc.) fired
    DeviceEventRaised {
        device_id: String,
        event: String,
        timestamp: i64,
    },

    // ========== Actions ==========
    /// An action request moved to a new status
    ActionStatusChanged {
        device_id: String,
        action: String,
        request_id: String,
        status: String,
        timestamp: i64,
    },
}

impl ZigbeeEvent {
    /// Get the event type name as a string.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::BridgeState { .. } => "BridgeState",
            Self::DeviceAdded { .. } => "DeviceAdded",
            Self::DeviceRemoved { .. } => "DeviceRemoved",
            Self::DeviceAvailability { .. } => "DeviceAvailability",
            Self::PropertyChanged { .. } => "PropertyChanged",
            Self::DeviceEventRaised { .. } => "DeviceEventRaised",
            Self::ActionStatusChanged { .. } => "ActionStatusChanged",
        }
    }

    /// Get the timestamp of this event.
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::BridgeState { timestamp, .. }
            | Self::DeviceAdded { timestamp, .. }
            | Self::DeviceRemoved { timestamp, .. }
            | Self::DeviceAvailability { timestamp, .. }
            | Self::PropertyChanged { timestamp, .. }
            | Self::DeviceEventRaised { timestamp, .. }
            | Self::ActionStatusChanged { timestamp, .. } => *timestamp,
        }
    }

    /// The device this event concerns, if any.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::BridgeState { .. } => None,
            Self::DeviceAdded { device_id, .. }
            | Self::DeviceRemoved { device_id, .. }
            | Self::DeviceAvailability { device_id, .. }
            | Self::PropertyChanged { device_id, .. }
            | Self::DeviceEventRaised { device_id, .. }
            | Self::ActionStatusChanged { device_id, .. } => Some(device_id),
        }
    }

    /// Check if this is a device lifecycle event.
    pub fn is_lifecycle_event(&self) -> bool {
        matches!(
            self,
            Self::DeviceAdded { .. } | Self::DeviceRemoved { .. } | Self::DeviceAvailability { .. }
        )
    }

    /// Check if this is a device state event (property or device event).
    pub fn is_state_event(&self) -> bool {
        matches!(
            self,
            Self::PropertyChanged { .. } | Self::DeviceEventRaised { .. }
        )
    }

    /// Check if this is an action event.
    pub fn is_action_event(&self) -> bool {
        matches!(self, Self::ActionStatusChanged { .. })
    }
}

impl fmt::Display for ZigbeeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Event metadata.
///
/// Attached to each event for tracking and correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event ID
    pub event_id: String,
    /// Optional correlation ID (action request id for action events)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Event source (component that published)
    pub source: String,
    /// Event timestamp
    pub timestamp: i64,
}

impl EventMetadata {
    /// Create new event metadata.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            correlation_id: None,
            source: source.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create with a specific correlation ID.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_name() {
        let event = ZigbeeEvent::DeviceEventRaised {
            device_id: "remote".to_string(),
            event: "single_left".to_string(),
            timestamp: 0,
        };
        assert_eq!(event.type_name(), "DeviceEventRaised");
        assert_eq!(event.to_string(), "DeviceEventRaised");
    }

    #[test]
    fn test_event_classification() {
        let event = ZigbeeEvent::PropertyChanged {
            device_id: "lamp1".to_string(),
            property: "state".to_string(),
            value: serde_json::json!(true),
            timestamp: 0,
        };
        assert!(event.is_state_event());
        assert!(!event.is_action_event());
        assert_eq!(event.device_id(), Some("lamp1"));

        let bridge = ZigbeeEvent::BridgeState {
            online: true,
            timestamp: 0,
        };
        assert_eq!(bridge.device_id(), None);
        assert!(!bridge.is_lifecycle_event());
    }

    #[test]
    fn test_event_serialization() {
        let event = ZigbeeEvent::DeviceAvailability {
            device_id: "plug".to_string(),
            available: false,
            timestamp: 42,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "DeviceAvailability");
        assert_eq!(json["available"], false);

        let back: ZigbeeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_metadata_correlation() {
        let meta = EventMetadata::new("device:lamp1").with_correlation_id("req-1");
        assert_eq!(meta.source, "device:lamp1");
        assert_eq!(meta.correlation_id.as_deref(), Some("req-1"));
        assert_eq!(meta.event_id.len(), 36);
    }
}
