//! Event bus connecting devices to the host runtime.
//!
//! Publishing is synchronous so the update dispatcher can notify from
//! non-async code paths; receiving is async.

use crate::event::{EventMetadata, ZigbeeEvent};
use tokio::sync::broadcast;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Event bus for ZigMind.
///
/// The event bus uses a broadcast channel to distribute events to all
/// subscribers. It supports:
/// - Publishing events with automatic metadata generation
/// - Subscribing to all events
/// - Filtered subscriptions for specific event types
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<(ZigbeeEvent, EventMetadata)>,
    name: String,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the specified capacity.
    ///
    /// The capacity determines how many events are buffered for slow subscribers.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            name: "default".to_string(),
        }
    }

    /// Create a new event bus with a name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            tx: broadcast::channel(DEFAULT_CHANNEL_CAPACITY).0,
            name: name.into(),
        }
    }

    /// Get the name of this event bus.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event with default metadata.
    ///
    /// Returns `true` if there was at least one subscriber. Events published
    /// while nobody listens are discarded.
    pub fn publish(&self, event: ZigbeeEvent) -> bool {
        self.publish_with_source(event, "system")
    }

    /// Publish an event with a custom source.
    pub fn publish_with_source(&self, event: ZigbeeEvent, source: impl Into<String>) -> bool {
        self.publish_with_metadata(event, EventMetadata::new(source))
    }

    /// Publish an event with custom metadata.
    pub fn publish_with_metadata(&self, event: ZigbeeEvent, metadata: EventMetadata) -> bool {
        self.tx.send((event, metadata)).is_ok()
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> EventBusReceiver {
        EventBusReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Subscribe to events matching a filter.
    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredReceiver<F>
    where
        F: Fn(&ZigbeeEvent) -> bool + Send + 'static,
    {
        FilteredReceiver::new(self.tx.subscribe(), filter)
    }

    /// Create a filtered subscription helper for common patterns.
    pub fn filter(&self) -> FilterBuilder {
        FilterBuilder {
            tx: self.tx.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for all events from the event bus.
pub struct EventBusReceiver {
    rx: broadcast::Receiver<(ZigbeeEvent, EventMetadata)>,
}

impl EventBusReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the event bus is closed. Lagged receivers skip the
    /// events they missed and keep going.
    pub async fn recv(&mut self) -> Option<(ZigbeeEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event bus receiver lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<(ZigbeeEvent, EventMetadata)> {
        self.rx.try_recv().ok()
    }
}

/// Receiver for filtered events from the event bus.
pub struct FilteredReceiver<F>
where
    F: Fn(&ZigbeeEvent) -> bool + Send,
{
    rx: broadcast::Receiver<(ZigbeeEvent, EventMetadata)>,
    filter: F,
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&ZigbeeEvent) -> bool + Send,
{
    fn new(rx: broadcast::Receiver<(ZigbeeEvent, EventMetadata)>, filter: F) -> Self {
        Self { rx, filter }
    }

    /// Receive the next event matching the filter.
    pub async fn recv(&mut self) -> Option<(ZigbeeEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok((event, meta)) => {
                    if (self.filter)(&event) {
                        return Some((event, meta));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive a matching event without blocking.
    pub fn try_recv(&mut self) -> Option<(ZigbeeEvent, EventMetadata)> {
        while let Ok((event, meta)) = self.rx.try_recv() {
            if (self.filter)(&event) {
                return Some((event, meta));
            }
        }
        None
    }
}

/// Builder for creating filtered subscriptions.
pub struct FilterBuilder {
    tx: broadcast::Sender<(ZigbeeEvent, EventMetadata)>,
}

impl FilterBuilder {
    /// Subscribe to device lifecycle events only.
    pub fn lifecycle_events(&self) -> FilteredReceiver<fn(&ZigbeeEvent) -> bool> {
        FilteredReceiver::new(self.tx.subscribe(), ZigbeeEvent::is_lifecycle_event)
    }

    /// Subscribe to property changes and device events only.
    pub fn state_events(&self) -> FilteredReceiver<fn(&ZigbeeEvent) -> bool> {
        FilteredReceiver::new(self.tx.subscribe(), ZigbeeEvent::is_state_event)
    }

    /// Subscribe to action status events only.
    pub fn action_events(&self) -> FilteredReceiver<fn(&ZigbeeEvent) -> bool> {
        FilteredReceiver::new(self.tx.subscribe(), ZigbeeEvent::is_action_event)
    }

    /// Subscribe to everything concerning one device.
    pub fn device(
        &self,
        device_id: impl Into<String>,
    ) -> FilteredReceiver<impl Fn(&ZigbeeEvent) -> bool + Send + 'static> {
        let target = device_id.into();
        FilteredReceiver::new(self.tx.subscribe(), move |event: &ZigbeeEvent| {
            event.device_id() == Some(target.as_str())
        })
    }

    /// Subscribe with a custom filter function.
    pub fn custom<F>(&self, filter: F) -> FilteredReceiver<F>
    where
        F: Fn(&ZigbeeEvent) -> bool + Send + 'static,
    {
        FilteredReceiver::new(self.tx.subscribe(), filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property_changed(device: &str) -> ZigbeeEvent {
        ZigbeeEvent::PropertyChanged {
            device_id: device.to_string(),
            property: "state".to_string(),
            value: serde_json::json!(true),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        assert!(bus.publish(property_changed("lamp1")));

        let (event, meta) = rx.recv().await.unwrap();
        assert_eq!(event.type_name(), "PropertyChanged");
        assert_eq!(meta.source, "system");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::with_name("empty");
        assert_eq!(bus.name(), "empty");
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!bus.publish(property_changed("lamp1")));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(property_changed("lamp1"));

        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_action_filter() {
        let bus = EventBus::new();
        let mut actions = bus.filter().action_events();

        bus.publish(property_changed("lamp1"));
        bus.publish(ZigbeeEvent::ActionStatusChanged {
            device_id: "lamp1".to_string(),
            action: "identify".to_string(),
            request_id: "r1".to_string(),
            status: "pending".to_string(),
            timestamp: 0,
        });

        let (event, _) = actions.recv().await.unwrap();
        assert!(event.is_action_event());
        assert!(actions.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_device_filter() {
        let bus = EventBus::new();
        let mut rx = bus.filter().device("plug");

        bus.publish(property_changed("lamp1"));
        bus.publish(property_changed("plug"));

        let (event, _) = rx.recv().await.unwrap();
        assert_eq!(event.device_id(), Some("plug"));
    }
}
