//! Status conditions
//!
//! Typed, timestamped status flags shared by every resource in this crate.
//! The condition list of a NodePool is the de facto state of its reconciliation.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single status condition, keyed by `type` within its owning list.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g. "Provisioned", "Configured")
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition
    pub status: ConditionStatus,

    /// Machine-readable reason for the last transition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message, the operator-visible diagnostic
    #[serde(default)]
    pub message: String,

    /// Time of the last Status or Reason change
    pub last_transition_time: DateTime<Utc>,
}

/// Condition status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ConditionStatus {
    /// Returns the wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known condition types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionType {
    /// Hardware allocation state
    Provisioned,
    /// Configuration (firmware, BIOS) state
    Configured,
    /// Validation of referenced objects
    Validation,
}

impl ConditionType {
    /// Returns the wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionType::Provisioned => "Provisioned",
            ConditionType::Configured => "Configured",
            ConditionType::Validation => "Validation",
        }
    }
}

impl AsRef<str> for ConditionType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known condition reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionReason {
    InProgress,
    Completed,
    Failed,
    NotFound,
    Unprovisioned,
    ConfigApplied,
    ConfigUpdate,
}

impl ConditionReason {
    /// Returns the wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionReason::InProgress => "InProgress",
            ConditionReason::Completed => "Completed",
            ConditionReason::Failed => "Failed",
            ConditionReason::NotFound => "NotFound",
            ConditionReason::Unprovisioned => "Unprovisioned",
            ConditionReason::ConfigApplied => "ConfigApplied",
            ConditionReason::ConfigUpdate => "ConfigurationUpdateRequested",
        }
    }
}

impl AsRef<str> for ConditionReason {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message reported when every node has applied its configuration
pub const CONFIG_SUCCESS_MESSAGE: &str = "Configuration has been applied successfully";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_serializes_type_field() {
        let condition = Condition {
            type_: ConditionType::Provisioned.to_string(),
            status: ConditionStatus::True,
            reason: ConditionReason::Completed.to_string(),
            message: "Provisioned".to_string(),
            last_transition_time: Utc::now(),
        };

        let value = serde_json::to_value(&condition).expect("serialize condition");
        assert_eq!(value["type"], "Provisioned");
        assert_eq!(value["status"], "True");
        assert_eq!(value["reason"], "Completed");
        assert!(value.get("lastTransitionTime").is_some());
    }

    #[test]
    fn test_condition_deserializes_without_message() {
        let condition: Condition = serde_json::from_value(serde_json::json!({
            "type": "Configured",
            "status": "False",
            "lastTransitionTime": "2024-01-01T00:00:00Z",
        }))
        .expect("deserialize condition");

        assert_eq!(condition.status, ConditionStatus::False);
        assert!(condition.reason.is_empty());
        assert!(condition.message.is_empty());
    }
}
