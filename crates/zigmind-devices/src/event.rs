//! Device events synthesized from the `action` expose.

use serde::{Deserialize, Serialize};

/// Press variant an event is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "PressedEvent")]
    Pressed,
    #[serde(rename = "DoublePressedEvent")]
    DoublePressed,
    #[serde(rename = "LongPressedEvent")]
    LongPressed,
}

impl EventKind {
    /// Host `@type` name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pressed => "PressedEvent",
            Self::DoublePressed => "DoublePressedEvent",
            Self::LongPressed => "LongPressedEvent",
        }
    }
}

/// One event the device can raise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescriptor {
    /// The literal `action` value
    pub name: String,
    #[serde(rename = "@type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<EventKind>,
}

impl EventDescriptor {
    pub fn new(name: impl Into<String>, kind: Option<EventKind>) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}
