//! Zigbee2MQTT device definitions and the `exposes` schema.
//!
//! The bridge publishes the full device list on `<prefix>/bridge/devices`:
//!
//! ```json
//! [{
//!   "friendly_name": "lamp1",
//!   "ieee_address": "0x00158d0001a2b3c4",
//!   "type": "Router",
//!   "definition": {
//!     "model": "LED1545G12",
//!     "vendor": "IKEA",
//!     "exposes": [{
//!       "type": "light",
//!       "features": [
//!         {"type": "binary", "name": "state", "property": "state", "access": 7,
//!          "value_on": "ON", "value_off": "OFF"},
//!         {"type": "numeric", "name": "brightness", "property": "brightness",
//!          "access": 7, "value_min": 0, "value_max": 254}
//!       ]
//!     }]
//!   }
//! }]
//! ```
//!
//! The schema is not under our control, so every field is optional and the
//! loosely typed ones (`values`, `value_on`, `value_off`) stay raw JSON until
//! the mapper looks at them. A mistyped field reads as absent and a malformed
//! node or device entry is dropped on its own; the rest of the list survives.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

/// Access bit: the value is reported in state updates.
pub const ACCESS_READ: u8 = 1;
/// Access bit: the value can be set through `<device>/set`.
pub const ACCESS_WRITE: u8 = 2;
/// Both read and write.
pub const ACCESS_READ_WRITE: u8 = ACCESS_READ | ACCESS_WRITE;

/// Expose node category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExposeKind {
    Light,
    Switch,
    Climate,
    Binary,
    Numeric,
    Enum,
    Text,
    Composite,
    List,
    /// Anything the bridge may add later (lock, fan, cover, ...)
    #[default]
    #[serde(other)]
    Other,
}

impl ExposeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Switch => "switch",
            Self::Climate => "climate",
            Self::Binary => "binary",
            Self::Numeric => "numeric",
            Self::Enum => "enum",
            Self::Text => "text",
            Self::Composite => "composite",
            Self::List => "list",
            Self::Other => "other",
        }
    }
}

/// One node of the `exposes` tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Expose {
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub kind: Option<ExposeKind>,
    #[serde(deserialize_with = "lenient")]
    pub name: Option<String>,
    /// Payload key when it differs from `name`
    #[serde(deserialize_with = "lenient")]
    pub property: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub access: Option<u8>,
    #[serde(deserialize_with = "lenient_features")]
    pub features: Option<Vec<Expose>>,
    pub values: Option<JsonValue>,
    #[serde(deserialize_with = "lenient")]
    pub value_min: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub value_max: Option<f64>,
    #[serde(deserialize_with = "lenient")]
    pub value_step: Option<f64>,
    pub value_on: Option<JsonValue>,
    pub value_off: Option<JsonValue>,
    #[serde(deserialize_with = "lenient")]
    pub unit: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub description: Option<String>,
}

impl Expose {
    /// The declared name, if present and non-empty.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    /// Key used in inbound/outbound payloads.
    pub fn wire_name(&self) -> Option<&str> {
        self.property
            .as_deref()
            .filter(|p| !p.is_empty())
            .or_else(|| self.name())
    }

    pub fn kind(&self) -> ExposeKind {
        self.kind.unwrap_or_default()
    }

    /// Raw access bits, 0 when absent.
    pub fn access(&self) -> u8 {
        self.access.unwrap_or(0)
    }

    /// Exact WRITE-only check (`access == WRITE`, not a bit test).
    pub fn is_write_only(&self) -> bool {
        self.access() == ACCESS_WRITE
    }

    pub fn is_readable(&self) -> bool {
        self.access() & ACCESS_READ != 0
    }

    pub fn is_writable(&self) -> bool {
        self.access() & ACCESS_WRITE != 0
    }

    /// `values` as a list of strings, or `None` when missing or mistyped.
    pub fn string_values(&self) -> Option<Vec<String>> {
        string_list(self.values.as_ref()?)
    }

    /// A node with `features` is a container.
    pub fn is_container(&self) -> bool {
        self.features.is_some()
    }
}

/// Interpret a JSON value as a list of strings.
pub fn string_list(value: &JsonValue) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// `definition` block of a device entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefinitionBody {
    #[serde(deserialize_with = "lenient")]
    pub model: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub vendor: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_exposes")]
    pub exposes: Vec<Expose>,
}

/// One entry of `<prefix>/bridge/devices`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceDefinition {
    pub friendly_name: String,
    #[serde(deserialize_with = "lenient")]
    pub ieee_address: Option<String>,
    /// Coordinator, Router or EndDevice
    #[serde(rename = "type", deserialize_with = "lenient")]
    pub device_type: Option<String>,
    pub definition: Option<DefinitionBody>,
}

impl DeviceDefinition {
    /// Build a definition from a friendly name and an exposes list.
    pub fn new(friendly_name: impl Into<String>, exposes: Vec<Expose>) -> Self {
        Self {
            friendly_name: friendly_name.into(),
            definition: Some(DefinitionBody {
                exposes,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn exposes(&self) -> &[Expose] {
        self.definition
            .as_ref()
            .map(|d| d.exposes.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_coordinator(&self) -> bool {
        self.device_type.as_deref() == Some("Coordinator")
    }

    /// Human readable title: "<vendor> <description>" when known.
    pub fn title(&self) -> String {
        match &self.definition {
            Some(DefinitionBody {
                vendor: Some(vendor),
                description: Some(description),
                ..
            }) => format!("{} ({} {})", self.friendly_name, vendor, description),
            _ => self.friendly_name.clone(),
        }
    }
}

/// Parse a `bridge/devices` payload.
///
/// Fails only when the payload is not a JSON array. Entries that do not
/// describe a device are logged and skipped.
pub fn parse_device_list(payload: &[u8]) -> Result<Vec<DeviceDefinition>, serde_json::Error> {
    let entries: Vec<JsonValue> = serde_json::from_slice(payload)?;
    Ok(entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(definition) => Some(definition),
            Err(e) => {
                warn!("Skipping malformed device entry #{}: {}", index, e);
                None
            }
        })
        .collect())
}

/// A field of the wrong type reads as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = JsonValue::deserialize(deserializer)?;
    if raw.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(raw.clone()) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            debug!("Ignoring mistyped field value {}: {}", raw, e);
            Ok(None)
        }
    }
}

fn lenient_features<'de, D>(deserializer: D) -> Result<Option<Vec<Expose>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(expose_list(JsonValue::deserialize(deserializer)?))
}

fn lenient_exposes<'de, D>(deserializer: D) -> Result<Vec<Expose>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(expose_list(JsonValue::deserialize(deserializer)?).unwrap_or_default())
}

/// Parse a list of expose nodes one by one, dropping the ones that are not objects.
fn expose_list(raw: JsonValue) -> Option<Vec<Expose>> {
    let JsonValue::Array(items) = raw else {
        if !raw.is_null() {
            debug!("Ignoring non-list exposes {}", raw);
        }
        return None;
    };
    let exposes = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(expose) => Some(expose),
            Err(e) => {
                warn!("Skipping malformed expose: {}", e);
                None
            }
        })
        .collect();
    Some(exposes)
}
