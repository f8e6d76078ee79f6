//! Zigbee2MQTT bridge coordinator.
//!
//! Owns the devices of one bridge instance, keeps them in sync with the
//! retained `bridge/devices` list and routes inbound messages to them.

use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use zigmind_core::{BridgeConfig, EventBus, ZigbeeEvent};

use crate::action::ActionRequest;
use crate::device::{Device, DeviceError, DeviceResult};
use crate::expose::{parse_device_list, DeviceDefinition};
use crate::transport::{InboundMessage, MessageBus, TransportResult};

const EVENT_SOURCE: &str = "bridge";

/// Coordinator for the devices behind one topic prefix.
pub struct ZigbeeBridge {
    prefix: String,
    bus: Arc<dyn MessageBus>,
    events: EventBus,
    devices: RwLock<BTreeMap<String, Arc<Device>>>,
    online: AtomicBool,
    poll_on_start: bool,
}

impl ZigbeeBridge {
    pub fn new(prefix: impl Into<String>, bus: Arc<dyn MessageBus>, events: EventBus) -> Self {
        Self {
            prefix: prefix.into(),
            bus,
            events,
            devices: RwLock::new(BTreeMap::new()),
            online: AtomicBool::new(false),
            poll_on_start: true,
        }
    }

    pub fn from_config(config: &BridgeConfig, bus: Arc<dyn MessageBus>, events: EventBus) -> Self {
        Self::new(config.topic_prefix.clone(), bus, events).with_poll_on_start(config.poll_on_start)
    }

    /// Whether new devices are polled right after they subscribe.
    pub fn with_poll_on_start(mut self, poll: bool) -> Self {
        self.poll_on_start = poll;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn devices_topic(&self) -> String {
        format!("{}/bridge/devices", self.prefix)
    }

    pub fn state_topic(&self) -> String {
        format!("{}/bridge/state", self.prefix)
    }

    /// Last state the bridge reported.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    pub fn device(&self, name: &str) -> Option<Arc<Device>> {
        self.devices.read().get(name).cloned()
    }

    /// All devices ordered by friendly name.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.read().values().cloned().collect()
    }

    /// Subscribe to the bridge topics.
    pub async fn start(&self) -> TransportResult<()> {
        self.bus.subscribe(&self.devices_topic()).await?;
        self.bus.subscribe(&self.state_topic()).await?;
        info!("Listening for Zigbee2MQTT devices on {}", self.prefix);
        Ok(())
    }

    /// Route inbound messages until the channel closes.
    pub async fn run(&self, mut inbound: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = inbound.recv().await {
            self.handle_message(&message.topic, &message.payload).await;
        }
        debug!("Inbound channel closed, bridge {} stopped", self.prefix);
    }

    /// Route one inbound message.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) {
        let Some(rest) = topic
            .strip_prefix(self.prefix.as_str())
            .and_then(|t| t.strip_prefix('/'))
        else {
            debug!("Ignoring message on foreign topic {}", topic);
            return;
        };

        match rest {
            "bridge/devices" => match parse_device_list(payload) {
                Ok(definitions) => self.update_devices(definitions).await,
                Err(e) => warn!("Malformed device list on {}: {}", topic, e),
            },
            "bridge/state" => match parse_online(payload) {
                Some(online) => self.set_online(online),
                None => warn!("Unrecognized bridge state on {}", topic),
            },
            _ if rest.starts_with("bridge/") => {}
            _ => self.route_device_message(topic, rest, payload),
        }
    }

    fn route_device_message(&self, topic: &str, rest: &str, payload: &[u8]) {
        if let Some(device) = self.device(rest) {
            match serde_json::from_slice::<JsonValue>(payload) {
                Ok(update) => device.apply_update(&update),
                Err(e) => warn!("Malformed state payload on {}: {}", topic, e),
            }
            return;
        }

        if let Some(name) = rest.strip_suffix("/availability") {
            match (self.device(name), parse_online(payload)) {
                (Some(device), Some(available)) => device.set_available(available),
                (Some(_), None) => warn!("Unrecognized availability payload on {}", topic),
                (None, _) => debug!("Availability for unknown device {}", name),
            }
            return;
        }

        if rest.ends_with("/set") || rest.ends_with("/get") {
            return;
        }

        debug!("No device for topic {}", topic);
    }

    fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::Relaxed);
        if previous != online {
            info!(
                "Bridge {} is {}",
                self.prefix,
                if online { "online" } else { "offline" }
            );
        }
        self.events.publish_with_source(
            ZigbeeEvent::BridgeState {
                online,
                timestamp: chrono::Utc::now().timestamp(),
            },
            EVENT_SOURCE,
        );
    }

    /// Reconcile the device set with a fresh definition list.
    ///
    /// Unchanged devices are kept, changed ones rebuilt, vanished ones
    /// removed. New and rebuilt devices subscribe and then poll.
    pub async fn update_devices(&self, definitions: Vec<DeviceDefinition>) {
        let mut fresh = Vec::new();
        let mut removed = Vec::new();

        {
            let mut devices = self.devices.write();
            let mut seen = Vec::with_capacity(definitions.len());

            for definition in definitions {
                if definition.is_coordinator() || definition.definition.is_none() {
                    continue;
                }
                if definition.friendly_name.is_empty() {
                    warn!("Skipping device entry without a friendly name");
                    continue;
                }
                let name = definition.friendly_name.clone();
                seen.push(name.clone());

                if let Some(existing) = devices.get(&name) {
                    if existing.definition() == &definition {
                        continue;
                    }
                    info!("Definition of {} changed, rebuilding", name);
                }

                let device = Arc::new(Device::new(
                    definition,
                    &self.prefix,
                    self.bus.clone(),
                    self.events.clone(),
                ));
                devices.insert(name, device.clone());
                fresh.push(device);
            }

            devices.retain(|name, _| {
                let keep = seen.contains(name);
                if !keep {
                    removed.push(name.clone());
                }
                keep
            });
        }

        for name in removed {
            info!("Device {} left the bridge", name);
            self.events.publish_with_source(
                ZigbeeEvent::DeviceRemoved {
                    device_id: name,
                    timestamp: chrono::Utc::now().timestamp(),
                },
                EVENT_SOURCE,
            );
        }

        for device in fresh {
            info!(
                "Device {} ready: {} properties, {} actions, {} events",
                device.id(),
                device.properties().len(),
                device.actions().len(),
                device.events().len()
            );
            device.announce();
            if let Err(e) = device.subscribe().await {
                warn!("Device {}: subscribe failed: {}", device.id(), e);
                continue;
            }
            if self.poll_on_start {
                device.request_values().await;
            }
        }
    }

    fn require(&self, name: &str) -> DeviceResult<Arc<Device>> {
        self.device(name)
            .ok_or_else(|| DeviceError::DeviceNotFound(name.to_string()))
    }

    pub async fn perform_action(
        &self,
        device: &str,
        action: &str,
        input: JsonValue,
    ) -> DeviceResult<ActionRequest> {
        self.require(device)?.perform_action(action, input).await
    }

    pub async fn set_property(
        &self,
        device: &str,
        property: &str,
        value: JsonValue,
    ) -> DeviceResult<()> {
        self.require(device)?.set_property(property, value).await
    }

    pub async fn request_values(&self, device: &str) -> DeviceResult<()> {
        self.require(device)?.request_values().await;
        Ok(())
    }
}

/// Parse `online`/`offline`, either raw, as a JSON string or as
/// `{"state": "online"}`.
pub fn parse_online(payload: &[u8]) -> Option<bool> {
    let state = match serde_json::from_slice::<JsonValue>(payload) {
        Ok(JsonValue::String(s)) => s,
        Ok(JsonValue::Object(map)) => map.get("state")?.as_str()?.to_string(),
        Ok(_) => return None,
        Err(_) => std::str::from_utf8(payload).ok()?.trim().to_string(),
    };
    match state.as_str() {
        "online" => Some(true),
        "offline" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_online() {
        assert_eq!(parse_online(b"online"), Some(true));
        assert_eq!(parse_online(b"offline"), Some(false));
        assert_eq!(parse_online(br#""online""#), Some(true));
        assert_eq!(parse_online(br#"{"state":"offline"}"#), Some(false));
        assert_eq!(parse_online(br#"{"status":"online"}"#), None);
        assert_eq!(parse_online(b"42"), None);
        assert_eq!(parse_online(b"maybe"), None);
    }
}
