//! Device category tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic label summarizing what a device can do.
///
/// The first four come from the typed mapping branches; the sensor tags are
/// derived from well-known generic property names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Light,
    SmartPlug,
    Thermostat,
    PushButton,
    DoorSensor,
    TemperatureSensor,
    HumiditySensor,
    MotionSensor,
    LeakSensor,
    SmokeSensor,
    EnergyMonitor,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "Light",
            Self::SmartPlug => "SmartPlug",
            Self::Thermostat => "Thermostat",
            Self::PushButton => "PushButton",
            Self::DoorSensor => "DoorSensor",
            Self::TemperatureSensor => "TemperatureSensor",
            Self::HumiditySensor => "HumiditySensor",
            Self::MotionSensor => "MotionSensor",
            Self::LeakSensor => "LeakSensor",
            Self::SmokeSensor => "SmokeSensor",
            Self::EnergyMonitor => "EnergyMonitor",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
