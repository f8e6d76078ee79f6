//! Mapping policy tables.
//!
//! Kept as plain data so the behavior can be reviewed (and tested) without
//! reading the mapper.

use crate::event::EventKind;

/// Names that never become properties and are dropped from updates.
///
/// Link diagnostics, firmware update state, calibration offsets and tuning
/// knobs the host model has no place for.
pub const IGNORED_PROPERTIES: &[&str] = &[
    "linkquality",
    "update",
    "update_available",
    "local_temperature_calibration",
    "temperature_calibration",
    "humidity_calibration",
    "illuminance_calibration",
    "motion_sensitivity",
    "sensitivity",
    "occupancy_timeout",
    "led_indication",
    "power_on_behavior",
    "color_temp_startup",
];

pub fn is_ignored(name: &str) -> bool {
    IGNORED_PROPERTIES.contains(&name)
}

/// How an event rule matches an `action` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMatch {
    Contains(&'static str),
    Equals(&'static str),
}

impl EventMatch {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Contains(needle) => value.contains(needle),
            Self::Equals(literal) => value == *literal,
        }
    }
}

/// One classification rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRule {
    pub matcher: EventMatch,
    pub kind: EventKind,
}

/// Evaluated in order; every rule is checked and the last match wins.
pub const EVENT_RULES: &[EventRule] = &[
    EventRule {
        matcher: EventMatch::Contains("single"),
        kind: EventKind::Pressed,
    },
    EventRule {
        matcher: EventMatch::Equals("on"),
        kind: EventKind::Pressed,
    },
    EventRule {
        matcher: EventMatch::Equals("toggle"),
        kind: EventKind::Pressed,
    },
    EventRule {
        matcher: EventMatch::Contains("double"),
        kind: EventKind::DoublePressed,
    },
    EventRule {
        matcher: EventMatch::Contains("release"),
        kind: EventKind::LongPressed,
    },
];

/// Tag for an `action` value, if any rule matches.
pub fn classify_event(value: &str) -> Option<EventKind> {
    EVENT_RULES
        .iter()
        .filter(|rule| rule.matcher.matches(value))
        .map(|rule| rule.kind)
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_list() {
        for name in IGNORED_PROPERTIES {
            assert!(is_ignored(name));
        }
        assert!(!is_ignored("state"));
        assert!(!is_ignored("contact"));
    }

    #[test]
    fn test_classify_pressed() {
        assert_eq!(classify_event("single"), Some(EventKind::Pressed));
        assert_eq!(classify_event("single_left"), Some(EventKind::Pressed));
        assert_eq!(classify_event("on"), Some(EventKind::Pressed));
        assert_eq!(classify_event("toggle"), Some(EventKind::Pressed));
        // equality, not substring
        assert_eq!(classify_event("on_press"), None);
        assert_eq!(classify_event("toggle_hold"), None);
    }

    #[test]
    fn test_classify_double_and_release() {
        assert_eq!(classify_event("double"), Some(EventKind::DoublePressed));
        assert_eq!(classify_event("double_right"), Some(EventKind::DoublePressed));
        assert_eq!(classify_event("brightness_up_release"), Some(EventKind::LongPressed));
        assert_eq!(classify_event("hold"), None);
    }

    #[test]
    fn test_last_rule_wins() {
        assert_eq!(classify_event("single_double"), Some(EventKind::DoublePressed));
        assert_eq!(classify_event("double_release"), Some(EventKind::LongPressed));
        assert_eq!(classify_event("single_release"), Some(EventKind::LongPressed));
    }
}
