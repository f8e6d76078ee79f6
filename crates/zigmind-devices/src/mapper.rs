//! Mapper from Zigbee2MQTT exposes to device capabilities.
//!
//! Walks the top-level expose list of a definition once and derives the
//! properties, actions, events and category tags of the device. Schema gaps
//! are logged and skipped; mapping never fails.

use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::action::ActionDescription;
use crate::category::Category;
use crate::event::EventDescriptor;
use crate::expose::{DeviceDefinition, Expose, ExposeKind};
use crate::policy::{classify_event, is_ignored};
use crate::property::Property;
use crate::units::semantic_type;

/// Everything a device can do, in declaration order.
///
/// Members are keyed by name; a later declaration replaces an earlier one in
/// place.
#[derive(Debug, Default)]
pub struct Capabilities {
    pub properties: Vec<Property>,
    pub actions: Vec<ActionDescription>,
    pub events: Vec<EventDescriptor>,
    pub categories: BTreeSet<Category>,
}

impl Capabilities {
    pub fn add_property(&mut self, property: Property) {
        match self
            .properties
            .iter_mut()
            .find(|p| p.name() == property.name())
        {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }

    pub fn add_action(&mut self, action: ActionDescription) {
        match self.actions.iter_mut().find(|a| a.name == action.name) {
            Some(existing) => *existing = action,
            None => self.actions.push(action),
        }
    }

    pub fn add_event(&mut self, event: EventDescriptor) {
        match self.events.iter_mut().find(|e| e.name == event.name) {
            Some(existing) => *existing = event,
            None => self.events.push(event),
        }
    }

    pub fn tag(&mut self, category: Category) {
        self.categories.insert(category);
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.actions.is_empty() && self.events.is_empty()
    }
}

/// Derive the capabilities of a device from its definition.
pub fn detect(definition: &DeviceDefinition) -> Capabilities {
    let mut caps = Capabilities::default();
    let device = definition.friendly_name.as_str();

    for expose in definition.exposes() {
        match expose.kind() {
            ExposeKind::Light => create_light(device, expose, &mut caps),
            ExposeKind::Switch => create_switch(device, expose, &mut caps),
            ExposeKind::Climate => create_climate(device, expose, &mut caps),
            _ => create_member(device, expose, &mut caps),
        }
    }

    debug!(
        "Mapped device {}: {} properties, {} actions, {} events",
        device,
        caps.properties.len(),
        caps.actions.len(),
        caps.events.len()
    );
    caps
}

fn features<'a>(device: &str, expose: &'a Expose) -> Option<&'a [Expose]> {
    let features = expose.features.as_deref();
    if features.is_none() {
        warn!(
            "Device {}: {} expose has no features, skipping",
            device,
            expose.kind().as_str()
        );
    }
    features
}

fn create_light(device: &str, expose: &Expose, caps: &mut Capabilities) {
    let Some(features) = features(device, expose) else {
        return;
    };
    caps.tag(Category::Light);

    for feature in features {
        let property = match feature.name() {
            Some("state") => Property::on_off(feature),
            Some("brightness") => Property::brightness(feature),
            Some("color_temp") => Property::color_temperature(feature),
            Some("color_xy") => Property::color(feature),
            _ => continue,
        };
        caps.add_property(property);
    }
}

fn create_switch(device: &str, expose: &Expose, caps: &mut Capabilities) {
    let Some(features) = features(device, expose) else {
        return;
    };
    caps.tag(Category::SmartPlug);

    for feature in features {
        if feature.name() == Some("state") {
            caps.add_property(Property::on_off(feature));
        }
    }
}

fn create_climate(device: &str, expose: &Expose, caps: &mut Capabilities) {
    let Some(features) = features(device, expose) else {
        return;
    };
    caps.tag(Category::Thermostat);

    for feature in features {
        match feature.name() {
            Some("system_mode") => {
                if let Some(property) = Property::generic(feature) {
                    caps.add_property(property.with_at_type("ThermostatModeProperty"));
                }
            }
            Some("running_state") => caps.add_property(Property::heating_cooling(feature)),
            _ => create_property(device, feature, caps),
        }
    }
}

/// Untyped node: event source, write-only action or generic property.
fn create_member(device: &str, expose: &Expose, caps: &mut Capabilities) {
    if expose.name() == Some("action") {
        create_events(device, expose, caps);
    } else if expose.is_write_only() {
        create_action(device, expose, caps);
    } else {
        create_property(device, expose, caps);
    }
}

fn create_events(device: &str, expose: &Expose, caps: &mut Capabilities) {
    let values = match expose.string_values() {
        Some(values) if !values.is_empty() => values,
        _ => {
            debug!("Device {}: action expose has no usable values", device);
            return;
        }
    };

    let mut tagged = false;
    for value in values {
        let kind = classify_event(&value);
        tagged |= kind.is_some();
        caps.add_event(EventDescriptor::new(value, kind));
    }

    if tagged {
        caps.tag(Category::PushButton);
    }
}

fn create_action(device: &str, expose: &Expose, caps: &mut Capabilities) {
    match ActionDescription::from_expose(expose) {
        Some(action) => caps.add_action(action),
        None => warn!("Device {}: write-only expose without a name", device),
    }
}

fn create_property(device: &str, expose: &Expose, caps: &mut Capabilities) {
    let Some(name) = expose.wire_name() else {
        warn!("Device {}: expose without a name, skipping", device);
        return;
    };

    if is_ignored(name) {
        return;
    }

    if expose.is_container() {
        debug!(
            "Device {}: composite expose {} is not flattened, skipping",
            device, name
        );
        return;
    }

    if name == "contact" {
        caps.add_property(Property::contact(expose));
        caps.tag(Category::DoorSensor);
        return;
    }

    if let Some(property) = Property::generic(expose) {
        if let Some((_, Some(category))) = semantic_type(name) {
            caps.tag(category);
        }
        caps.add_property(property);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::property::PropertyKind;
    use crate::units::ValueType;
    use serde_json::json;

    fn definition(exposes: serde_json::Value) -> DeviceDefinition {
        DeviceDefinition::new("dev", serde_json::from_value(exposes).unwrap())
    }

    fn names(caps: &Capabilities) -> Vec<&str> {
        caps.properties.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn test_light_features() {
        let caps = detect(&definition(json!([{
            "type": "light",
            "features": [
                {"type": "binary", "name": "state", "property": "state", "access": 7,
                 "value_on": "ON", "value_off": "OFF"},
                {"type": "numeric", "name": "brightness", "access": 7, "value_max": 254},
                {"type": "numeric", "name": "color_temp", "access": 7,
                 "value_min": 150, "value_max": 500},
                {"type": "composite", "name": "color_xy", "property": "color", "access": 7},
                {"type": "numeric", "name": "transition"}
            ]
        }])));

        assert_eq!(names(&caps), vec!["state", "brightness", "color_temp", "color"]);
        assert_eq!(caps.categories, BTreeSet::from([Category::Light]));
        assert!(matches!(
            caps.property("color").map(|p| p.kind()),
            Some(PropertyKind::Color)
        ));
    }

    #[test]
    fn test_endpoint_features_keep_their_payload_keys() {
        let caps = detect(&definition(json!([
            {"type": "light", "endpoint": "l1", "features": [
                {"type": "binary", "name": "state", "property": "state_l1", "access": 7},
                {"type": "numeric", "name": "brightness", "property": "brightness_l1", "access": 7}
            ]},
            {"type": "light", "endpoint": "l2", "features": [
                {"type": "binary", "name": "state", "property": "state_l2", "access": 7}
            ]}
        ])));

        assert_eq!(names(&caps), vec!["state_l1", "brightness_l1", "state_l2"]);
        assert!(matches!(
            caps.property("brightness_l1").map(|p| p.kind()),
            Some(PropertyKind::Brightness { .. })
        ));
        assert!(caps.property("state").is_none());
    }

    #[test]
    fn test_light_without_features() {
        let caps = detect(&definition(json!([{"type": "light"}])));
        assert!(caps.is_empty());
        assert!(caps.categories.is_empty());
    }

    #[test]
    fn test_switch_only_maps_state() {
        let caps = detect(&definition(json!([{
            "type": "switch",
            "features": [
                {"type": "binary", "name": "state", "access": 7},
                {"type": "numeric", "name": "brightness", "access": 7}
            ]
        }])));
        assert_eq!(names(&caps), vec!["state"]);
        assert!(caps.categories.contains(&Category::SmartPlug));
    }

    #[test]
    fn test_climate_features() {
        let caps = detect(&definition(json!([{
            "type": "climate",
            "features": [
                {"type": "enum", "name": "system_mode", "access": 7,
                 "values": ["off", "heat", "auto"]},
                {"type": "enum", "name": "running_state", "access": 5,
                 "values": ["idle", "heat"]},
                {"type": "numeric", "name": "occupied_heating_setpoint", "access": 7,
                 "unit": "°C", "value_step": 0.5},
                {"type": "numeric", "name": "local_temperature_calibration", "access": 7}
            ]
        }])));

        assert_eq!(
            names(&caps),
            vec!["system_mode", "running_state", "occupied_heating_setpoint"]
        );
        assert!(caps.categories.contains(&Category::Thermostat));
        let mode = caps.property("system_mode").unwrap().description();
        assert_eq!(mode.at_type.as_deref(), Some("ThermostatModeProperty"));
        assert_eq!(mode.value_type, ValueType::String);
    }

    #[test]
    fn test_action_values_become_events() {
        let caps = detect(&definition(json!([{
            "type": "enum", "name": "action", "access": 1,
            "values": ["single_left", "double_left", "hold_left", "release"]
        }])));

        let kinds: Vec<_> = caps.events.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("single_left", Some(EventKind::Pressed)),
                ("double_left", Some(EventKind::DoublePressed)),
                ("hold_left", None),
                ("release", Some(EventKind::LongPressed)),
            ]
        );
        assert!(caps.categories.contains(&Category::PushButton));
        assert!(caps.properties.is_empty());
    }

    #[test]
    fn test_untagged_events_do_not_tag_push_button() {
        let caps = detect(&definition(json!([{
            "type": "enum", "name": "action", "values": ["hold", "shake"]
        }])));
        assert_eq!(caps.events.len(), 2);
        assert!(caps.categories.is_empty());

        let caps = detect(&definition(json!([{"type": "enum", "name": "action", "values": []}])));
        assert!(caps.events.is_empty());

        let caps = detect(&definition(json!([{"type": "enum", "name": "action", "values": [1, 2]}])));
        assert!(caps.events.is_empty());
    }

    #[test]
    fn test_write_only_is_action_read_write_is_property() {
        let caps = detect(&definition(json!([
            {"type": "enum", "name": "effect", "access": 2, "values": ["blink", "okay"]},
            {"type": "numeric", "name": "level", "access": 3}
        ])));
        assert_eq!(caps.actions.len(), 1);
        assert_eq!(caps.actions[0].name, "effect");
        assert_eq!(names(&caps), vec!["level"]);
    }

    #[test]
    fn test_generic_properties_and_policy() {
        let caps = detect(&definition(json!([
            {"type": "binary", "name": "contact", "access": 1, "value_on": false, "value_off": true},
            {"type": "numeric", "name": "temperature", "access": 1, "unit": "°C"},
            {"type": "numeric", "name": "battery", "access": 1, "unit": "%", "value_step": 1},
            {"type": "numeric", "name": "linkquality", "access": 1},
            {"type": "composite", "name": "options", "features": [{"type": "numeric", "name": "x"}]},
            {"type": "numeric", "access": 1}
        ])));

        assert_eq!(names(&caps), vec!["contact", "temperature", "battery"]);
        assert!(matches!(
            caps.property("contact").map(|p| p.kind()),
            Some(PropertyKind::Contact)
        ));
        assert_eq!(
            caps.categories,
            BTreeSet::from([Category::DoorSensor, Category::TemperatureSensor])
        );
        let battery = caps.property("battery").unwrap().description();
        assert_eq!(battery.value_type, ValueType::Integer);
        assert_eq!(battery.unit.as_deref(), Some("percent"));
    }

    #[test]
    fn test_last_declaration_wins() {
        let caps = detect(&definition(json!([
            {"type": "numeric", "name": "power", "access": 1},
            {"type": "numeric", "name": "power", "access": 3}
        ])));
        assert_eq!(caps.properties.len(), 1);
        assert!(caps.property("power").unwrap().is_writable());
    }

    #[test]
    fn test_missing_definition_maps_nothing() {
        let def = DeviceDefinition {
            friendly_name: "bare".into(),
            ..Default::default()
        };
        assert!(detect(&def).is_empty());
    }
}
