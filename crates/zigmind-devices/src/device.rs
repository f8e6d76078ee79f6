//! Device aggregate.
//!
//! A `Device` is built once from a bridge definition and then handles the
//! three runtime paths: inbound state updates, outbound actions/writes and
//! poll requests. Host notifications go out on the event bus.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use zigmind_core::{EventBus, EventMetadata, ZigbeeEvent};

use crate::action::{ActionDescription, ActionRequest};
use crate::category::Category;
use crate::event::EventDescriptor;
use crate::expose::DeviceDefinition;
use crate::mapper::{detect, Capabilities};
use crate::policy::is_ignored;
use crate::property::{Property, PropertyDescription};
use crate::transport::{MessageBus, TransportError, TransportResult};

/// Finished and in-flight action requests kept per device.
pub const ACTION_HISTORY_LIMIT: usize = 64;

const EVENT_SOURCE: &str = "zigbee";

/// Device operation errors.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The message bus rejected the publish
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Action not found: {0}")]
    ActionNotFound(String),

    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    #[error("Property is read-only: {0}")]
    ReadOnly(String),

    #[error("Invalid value for {property}: {value}")]
    InvalidValue { property: String, value: JsonValue },
}

/// Result type for device operations.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// Serializable snapshot of a device's schema.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceDescription {
    pub id: String,
    pub title: String,
    #[serde(rename = "@type")]
    pub categories: Vec<Category>,
    pub properties: Vec<PropertyDescription>,
    pub actions: Vec<ActionDescription>,
    pub events: Vec<EventDescriptor>,
}

impl DeviceDescription {
    pub fn new(definition: &DeviceDefinition, capabilities: &Capabilities) -> Self {
        Self {
            id: definition.friendly_name.clone(),
            title: definition.title(),
            categories: capabilities.categories.iter().copied().collect(),
            properties: capabilities
                .properties
                .iter()
                .map(|p| p.description().clone())
                .collect(),
            actions: capabilities.actions.clone(),
            events: capabilities.events.clone(),
        }
    }
}

/// A Zigbee device exposed to the host.
pub struct Device {
    id: String,
    title: String,
    topic: String,
    definition: DeviceDefinition,
    capabilities: Capabilities,
    available: AtomicBool,
    bus: Arc<dyn MessageBus>,
    events: EventBus,
    action_requests: Mutex<VecDeque<ActionRequest>>,
}

impl Device {
    /// Build a device from its definition. Topic is `<prefix>/<friendly_name>`.
    pub fn new(
        definition: DeviceDefinition,
        topic_prefix: &str,
        bus: Arc<dyn MessageBus>,
        events: EventBus,
    ) -> Self {
        let capabilities = detect(&definition);
        Self {
            id: definition.friendly_name.clone(),
            title: definition.title(),
            topic: format!("{}/{}", topic_prefix, definition.friendly_name),
            definition,
            capabilities,
            available: AtomicBool::new(true),
            bus,
            events,
            action_requests: Mutex::new(VecDeque::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Inbound state topic. Writes go to `<topic>/set`, polls to `<topic>/get`.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn availability_topic(&self) -> String {
        format!("{}/availability", self.topic)
    }

    pub fn definition(&self) -> &DeviceDefinition {
        &self.definition
    }

    pub fn categories(&self) -> &BTreeSet<Category> {
        &self.capabilities.categories
    }

    pub fn properties(&self) -> &[Property] {
        &self.capabilities.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.capabilities.property(name)
    }

    pub fn actions(&self) -> &[ActionDescription] {
        &self.capabilities.actions
    }

    pub fn action(&self, name: &str) -> Option<&ActionDescription> {
        self.capabilities.actions.iter().find(|a| a.name == name)
    }

    pub fn events(&self) -> &[EventDescriptor] {
        &self.capabilities.events
    }

    pub fn event(&self, name: &str) -> Option<&EventDescriptor> {
        self.capabilities.events.iter().find(|e| e.name == name)
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Recent action requests, oldest first.
    pub fn action_requests(&self) -> Vec<ActionRequest> {
        self.action_requests.lock().iter().cloned().collect()
    }

    pub fn description(&self) -> DeviceDescription {
        DeviceDescription::new(&self.definition, &self.capabilities)
    }

    /// Announce the device on the event bus.
    pub fn announce(&self) {
        self.events.publish_with_source(
            ZigbeeEvent::DeviceAdded {
                device_id: self.id.clone(),
                title: self.title.clone(),
                categories: self
                    .categories()
                    .iter()
                    .map(|c| c.as_str().to_string())
                    .collect(),
                timestamp: now(),
            },
            EVENT_SOURCE,
        );
    }

    /// Subscribe to the device's state and availability topics.
    pub async fn subscribe(&self) -> TransportResult<()> {
        self.bus.subscribe(&self.topic).await?;
        self.bus.subscribe(&self.availability_topic()).await?;
        debug!("Subscribed to {}", self.topic);
        Ok(())
    }

    /// Record an availability report. Notifies the host on change.
    pub fn set_available(&self, available: bool) {
        let previous = self.available.swap(available, Ordering::Relaxed);
        if previous != available {
            info!(
                "Device {} is now {}",
                self.id,
                if available { "online" } else { "offline" }
            );
            self.events.publish_with_source(
                ZigbeeEvent::DeviceAvailability {
                    device_id: self.id.clone(),
                    available,
                    timestamp: now(),
                },
                EVENT_SOURCE,
            );
        }
    }

    /// Apply an inbound state snapshot.
    ///
    /// Unknown keys and unknown event values are expected under partial
    /// schema coverage and only logged at debug level.
    pub fn apply_update(&self, update: &JsonValue) {
        let empty = Map::new();
        let update = match update.as_object() {
            Some(map) => map,
            None => {
                warn!("Device {}: update is not an object: {}", self.id, update);
                &empty
            }
        };

        for (key, value) in update {
            if is_ignored(key) {
                continue;
            }

            if key == "action" {
                self.raise_event(value);
                continue;
            }

            match self.property(key) {
                Some(property) => {
                    if let Some(host) = property.update(value, update) {
                        self.events.publish_with_source(
                            ZigbeeEvent::PropertyChanged {
                                device_id: self.id.clone(),
                                property: key.clone(),
                                value: host,
                                timestamp: now(),
                            },
                            EVENT_SOURCE,
                        );
                    }
                }
                None => debug!("Device {}: no property for key '{}'", self.id, key),
            }
        }
    }

    fn raise_event(&self, value: &JsonValue) {
        let Some(name) = value.as_str() else {
            debug!("Device {}: non-string action value {}", self.id, value);
            return;
        };
        if name.is_empty() {
            return;
        }
        if self.event(name).is_none() {
            debug!("Device {}: unknown event '{}'", self.id, name);
            return;
        }
        self.events.publish_with_source(
            ZigbeeEvent::DeviceEventRaised {
                device_id: self.id.clone(),
                event: name.to_string(),
                timestamp: now(),
            },
            EVENT_SOURCE,
        );
    }

    /// Invoke an action: publish `{name: input}` to `<topic>/set`.
    ///
    /// The request is started before the publish and finished exactly once
    /// whatever the outcome.
    pub async fn perform_action(&self, name: &str, input: JsonValue) -> DeviceResult<ActionRequest> {
        if self.action(name).is_none() {
            return Err(DeviceError::ActionNotFound(name.to_string()));
        }

        let mut request = ActionRequest::new(name, input);
        request.start();
        self.record_request(&request);

        let payload = json!({ name: request.input.clone() });
        let mut pending = PendingAction {
            device: self,
            request,
        };
        let result = self.publish_set(&payload).await;
        let request = pending.finish(result.is_ok());

        match result {
            Ok(()) => {
                debug!("Device {}: action {} completed", self.id, name);
                Ok(request)
            }
            Err(e) => {
                warn!("Device {}: action {} failed: {}", self.id, name, e);
                Err(DeviceError::Transport(e))
            }
        }
    }

    /// Write a property from its host value.
    ///
    /// The cache is left alone; the bridge echoes the new state.
    pub async fn set_property(&self, name: &str, value: JsonValue) -> DeviceResult<()> {
        let property = self
            .property(name)
            .ok_or_else(|| DeviceError::PropertyNotFound(name.to_string()))?;
        if !property.is_writable() {
            return Err(DeviceError::ReadOnly(name.to_string()));
        }
        let wire = property
            .to_wire(&value)
            .ok_or_else(|| DeviceError::InvalidValue {
                property: name.to_string(),
                value: value.clone(),
            })?;

        let payload = json!({ name: wire });
        self.publish_set(&payload).await?;
        Ok(())
    }

    /// Ask the bridge to report every readable property.
    ///
    /// Failures are logged, not returned.
    pub async fn request_values(&self) {
        let request: Map<String, JsonValue> = self
            .properties()
            .iter()
            .filter(|p| p.is_readable())
            .map(|p| (p.name().to_string(), json!("")))
            .collect();

        if request.is_empty() {
            debug!("Device {}: no readable properties to poll", self.id);
            return;
        }

        let topic = format!("{}/get", self.topic);
        let payload = JsonValue::Object(request).to_string().into_bytes();
        if let Err(e) = self.bus.publish(&topic, payload).await {
            warn!("Device {}: poll request failed: {}", self.id, e);
        }
    }

    async fn publish_set(&self, payload: &JsonValue) -> TransportResult<()> {
        let topic = format!("{}/set", self.topic);
        self.bus
            .publish(&topic, payload.to_string().into_bytes())
            .await
    }

    fn record_request(&self, request: &ActionRequest) {
        {
            let mut requests = self.action_requests.lock();
            match requests.iter_mut().find(|r| r.id == request.id) {
                Some(existing) => *existing = request.clone(),
                None => {
                    if requests.len() >= ACTION_HISTORY_LIMIT {
                        requests.pop_front();
                    }
                    requests.push_back(request.clone());
                }
            }
        }

        self.events.publish_with_metadata(
            ZigbeeEvent::ActionStatusChanged {
                device_id: self.id.clone(),
                action: request.name.clone(),
                request_id: request.id.clone(),
                status: request.status.as_str().to_string(),
                timestamp: now(),
            },
            EventMetadata::new(EVENT_SOURCE).with_correlation_id(request.id.clone()),
        );
    }
}

/// An action request between its start and finish.
///
/// Dropping it unfinished (the caller gave up on the publish) records the
/// request as failed.
struct PendingAction<'a> {
    device: &'a Device,
    request: ActionRequest,
}

impl PendingAction<'_> {
    fn finish(&mut self, success: bool) -> ActionRequest {
        if self.request.finish(success) {
            self.device.record_request(&self.request);
        }
        self.request.clone()
    }
}

impl Drop for PendingAction<'_> {
    fn drop(&mut self) {
        if self.request.finish(false) {
            debug!(
                "Device {}: action {} dropped before the publish finished",
                self.device.id, self.request.name
            );
            self.device.record_request(&self.request);
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("categories", &self.capabilities.categories)
            .field("properties", &self.capabilities.properties.len())
            .field("actions", &self.capabilities.actions.len())
            .field("events", &self.capabilities.events.len())
            .finish()
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionStatus;
    use crate::transport::MockBus;

    fn lamp(bus: Arc<MockBus>, events: EventBus) -> Device {
        let exposes = serde_json::from_value(json!([
            {"type": "light", "features": [
                {"type": "binary", "name": "state", "access": 7, "value_on": "ON", "value_off": "OFF"},
                {"type": "numeric", "name": "brightness", "access": 7, "value_max": 254}
            ]},
            {"type": "numeric", "name": "battery", "access": 1},
            {"type": "enum", "name": "effect", "access": 2, "values": ["blink", "okay"]},
            {"type": "enum", "name": "action", "values": ["single", "double"]}
        ]))
        .unwrap();
        Device::new(
            DeviceDefinition::new("lamp1", exposes),
            "zigbee2mqtt",
            bus,
            events,
        )
    }

    #[test]
    fn test_topic_and_members() {
        let device = lamp(Arc::new(MockBus::new()), EventBus::new());
        assert_eq!(device.topic(), "zigbee2mqtt/lamp1");
        assert_eq!(device.availability_topic(), "zigbee2mqtt/lamp1/availability");
        assert!(device.property("brightness").is_some());
        assert!(device.action("effect").is_some());
        assert!(device.event("double").is_some());
        assert!(device.is_available());
    }

    #[tokio::test]
    async fn test_apply_update_publishes_changes_once() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let device = lamp(Arc::new(MockBus::new()), events);

        device.apply_update(&json!({"state": "ON", "linkquality": 90}));
        device.apply_update(&json!({"state": "ON"}));

        let (event, _) = rx.try_recv().unwrap();
        match event {
            ZigbeeEvent::PropertyChanged { property, value, .. } => {
                assert_eq!(property, "state");
                assert_eq!(value, json!(true));
            }
            other => panic!("unexpected event {}", other),
        }
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_non_object_update_is_ignored() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let device = lamp(Arc::new(MockBus::new()), events);

        device.apply_update(&json!("ON"));
        device.apply_update(&json!({"action": 42}));
        assert!(rx.try_recv().is_none());
        assert_eq!(device.property("state").unwrap().value(), JsonValue::Null);
    }

    #[tokio::test]
    async fn test_set_property_converts_to_wire() {
        let bus = Arc::new(MockBus::new());
        let device = lamp(bus.clone(), EventBus::new());

        device.set_property("brightness", json!(100)).await.unwrap();
        device.set_property("state", json!(false)).await.unwrap();

        let published = bus.published_json();
        assert_eq!(published[0].0, "zigbee2mqtt/lamp1/set");
        assert_eq!(published[0].1, json!({"brightness": 254}));
        assert_eq!(published[1].1, json!({"state": "OFF"}));
        // no optimistic update
        assert_eq!(device.property("state").unwrap().value(), JsonValue::Null);
    }

    #[tokio::test]
    async fn test_set_property_rejections() {
        let bus = Arc::new(MockBus::new());
        let device = lamp(bus.clone(), EventBus::new());

        assert!(matches!(
            device.set_property("battery", json!(50)).await,
            Err(DeviceError::ReadOnly(_))
        ));
        assert!(matches!(
            device.set_property("missing", json!(1)).await,
            Err(DeviceError::PropertyNotFound(_))
        ));
        assert!(matches!(
            device.set_property("brightness", json!("bright")).await,
            Err(DeviceError::InvalidValue { .. })
        ));
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_action_has_no_side_effects() {
        let bus = Arc::new(MockBus::new());
        let device = lamp(bus.clone(), EventBus::new());

        let err = device.perform_action("reboot", json!(true)).await.unwrap_err();
        assert!(matches!(err, DeviceError::ActionNotFound(name) if name == "reboot"));
        assert!(device.action_requests().is_empty());
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_action_history_is_bounded() {
        let device = lamp(Arc::new(MockBus::new()), EventBus::new());
        for _ in 0..ACTION_HISTORY_LIMIT + 5 {
            device.perform_action("effect", json!("blink")).await.unwrap();
        }
        let requests = device.action_requests();
        assert_eq!(requests.len(), ACTION_HISTORY_LIMIT);
        assert!(requests.iter().all(|r| r.status == ActionStatus::Completed));
    }

    /// Bus whose publish never completes.
    struct StalledBus;

    #[async_trait::async_trait]
    impl MessageBus for StalledBus {
        async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> TransportResult<()> {
            std::future::pending().await
        }

        async fn subscribe(&self, _topic: &str) -> TransportResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancelled_action_is_recorded_as_failed() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let exposes = serde_json::from_value(json!([
            {"type": "enum", "name": "effect", "access": 2, "values": ["blink"]}
        ]))
        .unwrap();
        let device = Device::new(
            DeviceDefinition::new("lamp1", exposes),
            "zigbee2mqtt",
            Arc::new(StalledBus),
            events,
        );

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            device.perform_action("effect", json!("blink")),
        )
        .await;
        assert!(outcome.is_err());

        let requests = device.action_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].status, ActionStatus::Failed);
        assert!(requests[0].time_completed.is_some());

        let statuses: Vec<String> = std::iter::from_fn(|| rx.try_recv())
            .filter_map(|(event, _)| match event {
                ZigbeeEvent::ActionStatusChanged { status, .. } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec!["pending".to_string(), "failed".to_string()]);
    }

    #[test]
    fn test_availability_change_notifies_once() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let device = lamp(Arc::new(MockBus::new()), events);

        device.set_available(true);
        assert!(rx.try_recv().is_none());
        device.set_available(false);
        device.set_available(false);
        assert!(matches!(
            rx.try_recv(),
            Some((ZigbeeEvent::DeviceAvailability { available: false, .. }, _))
        ));
        assert!(rx.try_recv().is_none());
        assert!(!device.is_available());
    }

    #[test]
    fn test_description_serializes() {
        let device = lamp(Arc::new(MockBus::new()), EventBus::new());
        let value = serde_json::to_value(device.description()).unwrap();
        assert_eq!(value["id"], "lamp1");
        assert_eq!(value["@type"], json!(["Light", "PushButton"]));
        assert_eq!(value["properties"].as_array().unwrap().len(), 3);
    }
}
