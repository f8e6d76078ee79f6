//! Value type and unit inference for exposes.
//!
//! Pure lookups: the bridge's declared `type`/`unit` become the host
//! schema's value type, unit and semantic `@type`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::category::Category;
use crate::expose::{Expose, ExposeKind};

/// Host value type of a property or action input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Integer,
    Number,
    #[default]
    String,
    Object,
    Array,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Number)
    }
}

/// Infer the host value type of an expose.
///
/// Numeric exposes are integers only when they declare a whole-number step.
pub fn parse_type(expose: &Expose) -> ValueType {
    match expose.kind() {
        ExposeKind::Binary => ValueType::Boolean,
        ExposeKind::Numeric => match expose.value_step {
            Some(step) if step.fract() == 0.0 && step > 0.0 => ValueType::Integer,
            _ => ValueType::Number,
        },
        ExposeKind::Enum | ExposeKind::Text => ValueType::String,
        ExposeKind::Composite => ValueType::Object,
        ExposeKind::List => ValueType::Array,
        _ => ValueType::String,
    }
}

/// Bridge unit -> host unit.
const UNITS: &[(&str, &str)] = &[
    ("°C", "degree celsius"),
    ("°F", "degree fahrenheit"),
    ("%", "percent"),
    ("lx", "lux"),
    ("W", "watt"),
    ("kWh", "kilowatt hour"),
    ("V", "volt"),
    ("A", "ampere"),
    ("mA", "milliampere"),
    ("hPa", "hectopascal"),
    ("kPa", "kilopascal"),
    ("ppm", "ppm"),
    ("µg/m³", "microgram per cubic meter"),
    ("s", "second"),
    ("min", "minute"),
    ("mired", "mired"),
    ("K", "kelvin"),
];

/// Map a raw unit string to the host unit name.
pub fn parse_unit(raw: Option<&str>) -> Option<&'static str> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let unit = UNITS
        .iter()
        .find(|(bridge, _)| *bridge == raw)
        .map(|(_, host)| *host);
    if unit.is_none() {
        debug!("Unknown unit '{}', property will carry no unit", raw);
    }
    unit
}

/// Well-known generic property names -> host `@type` and device category.
const SEMANTIC_TYPES: &[(&str, &str, Option<Category>)] = &[
    ("temperature", "TemperatureProperty", Some(Category::TemperatureSensor)),
    ("local_temperature", "TemperatureProperty", None),
    (
        "occupied_heating_setpoint",
        "TargetTemperatureProperty",
        None,
    ),
    (
        "current_heating_setpoint",
        "TargetTemperatureProperty",
        None,
    ),
    ("humidity", "HumidityProperty", Some(Category::HumiditySensor)),
    ("occupancy", "MotionProperty", Some(Category::MotionSensor)),
    ("water_leak", "LeakProperty", Some(Category::LeakSensor)),
    ("smoke", "SmokeProperty", Some(Category::SmokeSensor)),
    ("power", "InstantaneousPowerProperty", Some(Category::EnergyMonitor)),
    ("voltage", "VoltageProperty", None),
    ("current", "CurrentProperty", None),
    ("battery", "LevelProperty", None),
];

/// Semantic `@type` for a generic property name, with the category the
/// device gains when it has one.
pub fn semantic_type(name: &str) -> Option<(&'static str, Option<Category>)> {
    SEMANTIC_TYPES
        .iter()
        .find(|(key, _, _)| *key == name)
        .map(|(_, at_type, category)| (*at_type, *category))
}
