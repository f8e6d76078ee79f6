//! Typed properties and their wire <-> host conversions.
//!
//! Every property is bound to one expose leaf. The wrapper variant is picked
//! once when the device is mapped; afterwards inbound updates and outbound
//! writes go through [`Property::update`] and [`Property::to_wire`].

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use tracing::debug;

use crate::color::{xy_to_rgb, Rgb};
use crate::expose::{Expose, ExposeKind};
use crate::units::{parse_type, parse_unit, semantic_type, ValueType};

/// Default upper bound of the Zigbee brightness scale.
pub const BRIGHTNESS_WIRE_MAX: f64 = 254.0;

const RUNNING_STATES: &[(&str, &str)] = &[("idle", "off"), ("heat", "heating"), ("cool", "cooling")];

/// Wire <-> host mapping a property applies.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    /// `state` of a light or switch.
    OnOff {
        value_on: JsonValue,
        value_off: JsonValue,
    },
    /// 0..=`wire_max` on the wire, percent on the host.
    Brightness { wire_max: f64 },
    /// Mired on the wire, kelvin on the host.
    ColorTemperature,
    /// CIE xy on the wire, `#rrggbb` on the host.
    Color,
    /// `contact` inverted into an open flag.
    Contact,
    /// Thermostat `running_state`.
    HeatingCooling,
    Generic {
        value_on: Option<JsonValue>,
        value_off: Option<JsonValue>,
    },
}

impl PropertyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnOff { .. } => "on_off",
            Self::Brightness { .. } => "brightness",
            Self::ColorTemperature => "color_temperature",
            Self::Color => "color",
            Self::Contact => "contact",
            Self::HeatingCooling => "heating_cooling",
            Self::Generic { .. } => "generic",
        }
    }
}

/// Host-facing schema of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescription {
    pub name: String,
    #[serde(rename = "@type", skip_serializing_if = "Option::is_none")]
    pub at_type: Option<String>,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(rename = "readOnly")]
    pub read_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PropertyDescription {
    fn new(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            at_type: None,
            value_type,
            unit: None,
            minimum: None,
            maximum: None,
            enum_values: None,
            read_only: false,
            description: None,
        }
    }
}

/// A device property with its last known host value.
#[derive(Debug)]
pub struct Property {
    description: PropertyDescription,
    kind: PropertyKind,
    readable: bool,
    writable: bool,
    value: RwLock<JsonValue>,
}

/// Typed wrappers default to read/write when the expose carries no access bits.
fn typed_access(expose: &Expose) -> (bool, bool) {
    match expose.access {
        Some(_) => (expose.is_readable(), expose.is_writable()),
        None => (true, true),
    }
}

/// Payload key of a typed wrapper; endpoint variants like `state_l1` keep their key.
fn payload_key<'a>(expose: &'a Expose, default: &'a str) -> &'a str {
    expose.wire_name().unwrap_or(default)
}

impl Property {
    fn build(
        mut description: PropertyDescription,
        kind: PropertyKind,
        readable: bool,
        writable: bool,
    ) -> Self {
        description.read_only = !writable;
        Self {
            description,
            kind,
            readable,
            writable,
            value: RwLock::new(JsonValue::Null),
        }
    }

    /// Light/switch `state`.
    pub fn on_off(expose: &Expose) -> Self {
        let name = payload_key(expose, "state");
        let mut description = PropertyDescription::new(name, ValueType::Boolean);
        description.at_type = Some("OnOffProperty".into());
        description.description = expose.description.clone();
        let (readable, writable) = typed_access(expose);
        let kind = PropertyKind::OnOff {
            value_on: expose.value_on.clone().unwrap_or_else(|| json!("ON")),
            value_off: expose.value_off.clone().unwrap_or_else(|| json!("OFF")),
        };
        Self::build(description, kind, readable, writable)
    }

    /// Light `brightness`, exposed to the host as percent.
    pub fn brightness(expose: &Expose) -> Self {
        let name = payload_key(expose, "brightness");
        let mut description = PropertyDescription::new(name, ValueType::Integer);
        description.at_type = Some("BrightnessProperty".into());
        description.unit = Some("percent".into());
        description.minimum = Some(0.0);
        description.maximum = Some(100.0);
        description.description = expose.description.clone();
        let (readable, writable) = typed_access(expose);
        let wire_max = expose
            .value_max
            .filter(|max| *max > 0.0)
            .unwrap_or(BRIGHTNESS_WIRE_MAX);
        Self::build(
            description,
            PropertyKind::Brightness { wire_max },
            readable,
            writable,
        )
    }

    /// Light `color_temp`, exposed to the host in kelvin.
    pub fn color_temperature(expose: &Expose) -> Self {
        let name = payload_key(expose, "color_temp");
        let mut description = PropertyDescription::new(name, ValueType::Integer);
        description.at_type = Some("ColorTemperatureProperty".into());
        description.unit = Some("kelvin".into());
        // the mired range inverts into the kelvin range
        description.minimum = expose.value_max.and_then(mired_to_kelvin).map(|k| k as f64);
        description.maximum = expose.value_min.and_then(mired_to_kelvin).map(|k| k as f64);
        description.description = expose.description.clone();
        let (readable, writable) = typed_access(expose);
        Self::build(description, PropertyKind::ColorTemperature, readable, writable)
    }

    /// Light `color_xy`, published under the `color` key.
    pub fn color(expose: &Expose) -> Self {
        let name = expose
            .property
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or("color");
        let mut description = PropertyDescription::new(name, ValueType::String);
        description.at_type = Some("ColorProperty".into());
        description.description = expose.description.clone();
        let (readable, writable) = typed_access(expose);
        Self::build(description, PropertyKind::Color, readable, writable)
    }

    /// Door/window `contact`, exposed as an open flag.
    pub fn contact(expose: &Expose) -> Self {
        let name = payload_key(expose, "contact");
        let mut description = PropertyDescription::new(name, ValueType::Boolean);
        description.at_type = Some("OpenProperty".into());
        description.description = expose.description.clone();
        let (readable, _) = typed_access(expose);
        Self::build(description, PropertyKind::Contact, readable, false)
    }

    /// Thermostat `running_state`.
    pub fn heating_cooling(expose: &Expose) -> Self {
        let name = payload_key(expose, "running_state");
        let mut description = PropertyDescription::new(name, ValueType::String);
        description.at_type = Some("HeatingCoolingProperty".into());
        description.enum_values = Some(
            RUNNING_STATES
                .iter()
                .map(|(_, host)| host.to_string())
                .collect(),
        );
        description.description = expose.description.clone();
        let (readable, _) = typed_access(expose);
        Self::build(description, PropertyKind::HeatingCooling, readable, false)
    }

    /// Any other leaf. `None` when the expose has no usable name.
    pub fn generic(expose: &Expose) -> Option<Self> {
        let name = expose.wire_name()?;
        let value_type = parse_type(expose);
        let mut description = PropertyDescription::new(name, value_type);
        description.at_type = semantic_type(name).map(|(at_type, _)| at_type.to_string());
        description.unit = parse_unit(expose.unit.as_deref()).map(str::to_string);
        description.minimum = expose.value_min;
        description.maximum = expose.value_max;
        description.enum_values = expose.string_values();
        description.description = expose.description.clone();

        let kind = match expose.kind() {
            ExposeKind::Binary => PropertyKind::Generic {
                value_on: expose.value_on.clone(),
                value_off: expose.value_off.clone(),
            },
            _ => PropertyKind::Generic {
                value_on: None,
                value_off: None,
            },
        };
        Some(Self::build(
            description,
            kind,
            expose.is_readable(),
            expose.is_writable(),
        ))
    }

    /// Override the semantic `@type`.
    pub fn with_at_type(mut self, at_type: impl Into<String>) -> Self {
        self.description.at_type = Some(at_type.into());
        self
    }

    /// Name on the host model and key in bridge payloads.
    pub fn name(&self) -> &str {
        &self.description.name
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    pub fn description(&self) -> &PropertyDescription {
        &self.description
    }

    /// Included in `/get` poll requests.
    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Last known host value, `null` until the first update.
    pub fn value(&self) -> JsonValue {
        self.value.read().clone()
    }

    /// Apply an inbound wire value.
    ///
    /// `update` is the whole payload the value came from. Returns the new
    /// host value when the cached value changed.
    pub fn update(&self, raw: &JsonValue, update: &Map<String, JsonValue>) -> Option<JsonValue> {
        let host = self.to_host(raw, update)?;
        let mut current = self.value.write();
        if *current == host {
            return None;
        }
        *current = host.clone();
        Some(host)
    }

    fn to_host(&self, raw: &JsonValue, update: &Map<String, JsonValue>) -> Option<JsonValue> {
        let host = match &self.kind {
            PropertyKind::OnOff {
                value_on,
                value_off,
            } => binary_to_host(raw, Some(value_on), Some(value_off)),
            PropertyKind::Brightness { wire_max } => raw
                .as_f64()
                .map(|wire| json!((wire / wire_max * 100.0).round().clamp(0.0, 100.0) as i64)),
            PropertyKind::ColorTemperature => raw.as_f64().and_then(mired_to_kelvin).map(|k| json!(k)),
            PropertyKind::Color => {
                if update.get("color_mode").and_then(JsonValue::as_str) == Some("color_temp") {
                    debug!("Ignoring stale color of '{}' in color_temp mode", self.name());
                    return None;
                }
                let x = raw.get("x").and_then(JsonValue::as_f64);
                let y = raw.get("y").and_then(JsonValue::as_f64);
                x.zip(y)
                    .and_then(|(x, y)| xy_to_rgb(x, y))
                    .map(|rgb| json!(rgb.to_hex()))
            }
            PropertyKind::Contact => raw.as_bool().map(|contact| json!(!contact)),
            PropertyKind::HeatingCooling => raw.as_str().and_then(|state| {
                RUNNING_STATES
                    .iter()
                    .find(|(wire, _)| *wire == state)
                    .map(|(_, host)| json!(host))
            }),
            PropertyKind::Generic {
                value_on,
                value_off,
            } => {
                if self.description.value_type == ValueType::Boolean {
                    binary_to_host(raw, value_on.as_ref(), value_off.as_ref())
                } else if matches_type(self.description.value_type, raw) {
                    Some(raw.clone())
                } else {
                    None
                }
            }
        };

        if host.is_none() {
            debug!(
                "Value {} does not fit property '{}' ({})",
                raw,
                self.name(),
                self.kind.as_str()
            );
        }
        host
    }

    /// Convert a host value into the wire value written to `/set`.
    ///
    /// `None` when the value does not fit the property.
    pub fn to_wire(&self, host: &JsonValue) -> Option<JsonValue> {
        match &self.kind {
            PropertyKind::OnOff {
                value_on,
                value_off,
            } => host
                .as_bool()
                .map(|on| if on { value_on.clone() } else { value_off.clone() }),
            PropertyKind::Brightness { wire_max } => host
                .as_f64()
                .filter(|percent| (0.0..=100.0).contains(percent))
                .map(|percent| json!((percent / 100.0 * wire_max).round() as i64)),
            PropertyKind::ColorTemperature => host
                .as_f64()
                .and_then(kelvin_to_mired)
                .map(|mired| json!(mired)),
            PropertyKind::Color => host
                .as_str()
                .and_then(Rgb::from_hex)
                .map(|rgb| json!({ "hex": rgb.to_hex() })),
            PropertyKind::Contact | PropertyKind::HeatingCooling => None,
            PropertyKind::Generic {
                value_on,
                value_off,
            } => match (host, value_on, value_off) {
                (JsonValue::Bool(true), Some(on), _) => Some(on.clone()),
                (JsonValue::Bool(false), _, Some(off)) => Some(off.clone()),
                _ if matches_type(self.description.value_type, host) => Some(host.clone()),
                _ => None,
            },
        }
    }
}

fn binary_to_host(
    raw: &JsonValue,
    value_on: Option<&JsonValue>,
    value_off: Option<&JsonValue>,
) -> Option<JsonValue> {
    if Some(raw) == value_on {
        Some(json!(true))
    } else if Some(raw) == value_off {
        Some(json!(false))
    } else {
        raw.as_bool().map(JsonValue::Bool)
    }
}

fn matches_type(value_type: ValueType, value: &JsonValue) -> bool {
    match value_type {
        ValueType::Boolean => value.is_boolean(),
        ValueType::Integer | ValueType::Number => value.is_number(),
        // enum/text values are occasionally numeric on the wire
        ValueType::String => value.is_string() || value.is_number(),
        ValueType::Object => value.is_object(),
        ValueType::Array => value.is_array(),
    }
}

/// 1,000,000 / mired, rounded. `None` for non-positive input.
pub fn mired_to_kelvin(mired: f64) -> Option<i64> {
    (mired > 0.0).then(|| (1_000_000.0 / mired).round() as i64)
}

/// 1,000,000 / kelvin, rounded. `None` for non-positive input.
pub fn kelvin_to_mired(kelvin: f64) -> Option<i64> {
    (kelvin > 0.0).then(|| (1_000_000.0 / kelvin).round() as i64)
}
