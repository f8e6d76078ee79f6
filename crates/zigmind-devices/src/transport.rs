//! Message bus seam between devices and the broker client.
//!
//! Devices only publish and subscribe; delivery, QoS and reconnects belong
//! to the implementation behind [`MessageBus`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Transport error type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Publish was rejected by the client
    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Subscribe was rejected by the client
    #[error("Subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    /// No connection to the broker
    #[error("Not connected: {0}")]
    NotConnected(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Publish/subscribe client a device talks through.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a payload to a topic.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> TransportResult<()>;

    /// Subscribe to a topic. Messages arrive through the implementation's
    /// inbound channel.
    async fn subscribe(&self, topic: &str) -> TransportResult<()>;
}

/// In-memory bus for testing.
///
/// Records every publish and subscribe; can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct MockBus {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    subscriptions: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus whose publishes fail.
    pub fn failing() -> Self {
        let bus = Self::new();
        bus.set_failing(true);
        bus
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// All publishes so far, in order.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().clone()
    }

    /// Publishes decoded as JSON. Non-JSON payloads become `null`.
    pub fn published_json(&self) -> Vec<(String, serde_json::Value)> {
        self.published
            .lock()
            .iter()
            .map(|(topic, payload)| {
                (
                    topic.clone(),
                    serde_json::from_slice(payload).unwrap_or(serde_json::Value::Null),
                )
            })
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    pub fn clear(&self) {
        self.published.lock().clear();
        self.subscriptions.lock().clear();
    }
}

#[async_trait]
impl MessageBus for MockBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> TransportResult<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(TransportError::Publish {
                topic: topic.to_string(),
                reason: "mock failure".to_string(),
            });
        }
        self.published.lock().push((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> TransportResult<()> {
        self.subscriptions.lock().push(topic.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_bus_records() {
        let bus = MockBus::new();
        bus.subscribe("zigbee2mqtt/lamp").await.unwrap();
        bus.publish("zigbee2mqtt/lamp/set", br#"{"state":"ON"}"#.to_vec())
            .await
            .unwrap();

        assert_eq!(bus.subscriptions(), vec!["zigbee2mqtt/lamp".to_string()]);
        let published = bus.published_json();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1["state"], "ON");
    }

    #[tokio::test]
    async fn test_mock_bus_failing() {
        let bus = MockBus::failing();
        let err = bus.publish("t", Vec::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::Publish { .. }));
        assert!(bus.published().is_empty());

        bus.set_failing(false);
        assert!(bus.publish("t", Vec::new()).await.is_ok());
    }
}
