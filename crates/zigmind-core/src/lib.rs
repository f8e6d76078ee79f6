//! Core types shared across ZigMind.
//!
//! Configuration, the unified error type and the event bus that carries
//! device notifications to the host runtime.

pub mod config;
pub mod error;
pub mod event;
pub mod eventbus;

pub use config::{BridgeConfig, MqttSettings};
pub use error::{Error, Result};
pub use event::{EventMetadata, ZigbeeEvent};
pub use eventbus::{
    DEFAULT_CHANNEL_CAPACITY, EventBus, EventBusReceiver, FilterBuilder, FilteredReceiver,
};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::config::{BridgeConfig, MqttSettings, defaults, env_vars};
    pub use crate::error::{Error, Result};
    pub use crate::event::{EventMetadata, ZigbeeEvent};
    pub use crate::eventbus::EventBus;
}
