//! Write-only device actions and their invocation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::expose::Expose;
use crate::units::{parse_type, parse_unit, ValueType};

/// Schema of the value an action accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInput {
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

/// An action the device offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescription {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input: ActionInput,
}

impl ActionDescription {
    /// Build from a write-only expose. `None` without a usable name.
    pub fn from_expose(expose: &Expose) -> Option<Self> {
        let name = expose.wire_name()?;
        Some(Self {
            name: name.to_string(),
            description: expose.description.clone(),
            input: ActionInput {
                value_type: parse_type(expose),
                unit: parse_unit(expose.unit.as_deref()).map(str::to_string),
                enum_values: expose.string_values(),
                minimum: expose.value_min,
                maximum: expose.value_max,
            },
        })
    }
}

/// Lifecycle of one action invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// Created, nothing sent yet
    Created,
    /// Started, publish in flight
    Pending,
    Completed,
    Failed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invocation of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: String,
    pub name: String,
    pub input: JsonValue,
    pub status: ActionStatus,
    pub time_requested: DateTime<Utc>,
    pub time_started: Option<DateTime<Utc>>,
    pub time_completed: Option<DateTime<Utc>>,
}

impl ActionRequest {
    pub fn new(name: impl Into<String>, input: JsonValue) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            input,
            status: ActionStatus::Created,
            time_requested: Utc::now(),
            time_started: None,
            time_completed: None,
        }
    }

    /// Mark the request as started.
    pub fn start(&mut self) {
        if self.status == ActionStatus::Created {
            self.status = ActionStatus::Pending;
            self.time_started = Some(Utc::now());
        }
    }

    /// Mark the request as finished. Only the first call has an effect.
    pub fn finish(&mut self, success: bool) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = if success {
            ActionStatus::Completed
        } else {
            ActionStatus::Failed
        };
        self.time_completed = Some(Utc::now());
        true
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}
