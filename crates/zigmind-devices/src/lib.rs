//! Zigbee2MQTT device mapping.
//!
//! Turns the `exposes` schema the bridge publishes for each device into typed
//! properties, actions and events, and keeps them in sync with the bridge
//! over a message bus.

pub mod action;
pub mod bridge;
pub mod category;
pub mod color;
pub mod device;
pub mod event;
pub mod expose;
pub mod mapper;
#[cfg(feature = "mqtt")]
pub mod mqtt;
pub mod policy;
pub mod property;
pub mod transport;
pub mod units;

pub use action::{ActionDescription, ActionInput, ActionRequest, ActionStatus};
pub use bridge::ZigbeeBridge;
pub use category::Category;
pub use device::{Device, DeviceDescription, DeviceError, DeviceResult};
pub use event::{EventDescriptor, EventKind};
pub use expose::{DeviceDefinition, Expose, ExposeKind};
pub use mapper::{detect, Capabilities};
#[cfg(feature = "mqtt")]
pub use mqtt::MqttBus;
pub use property::{Property, PropertyDescription, PropertyKind};
pub use transport::{InboundMessage, MessageBus, MockBus, TransportError, TransportResult};
pub use units::ValueType;
