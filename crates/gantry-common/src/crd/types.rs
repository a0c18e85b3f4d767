//! Shared status types

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition recorded on the provider status
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., MachineCreated)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Insert or refresh `condition` in `conditions`, keyed by type.
///
/// At most one entry per type exists afterwards. An existing entry is
/// replaced in place; its transition time is kept when the status did not
/// change.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

/// Look up a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn set_condition_appends_new_type() {
        let mut conditions = vec![Condition::new("Other", ConditionStatus::True, "R", "m")];
        set_condition(
            &mut conditions,
            Condition::new("MachineCreated", ConditionStatus::False, "Failed", "boom"),
        );
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[1].type_, "MachineCreated");
    }

    #[test]
    fn set_condition_replaces_in_place() {
        let mut conditions = vec![
            Condition::new("MachineCreated", ConditionStatus::False, "Failed", "boom"),
            Condition::new("Other", ConditionStatus::True, "R", "m"),
        ];
        set_condition(
            &mut conditions,
            Condition::new("MachineCreated", ConditionStatus::True, "Succeeded", "ok"),
        );
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].status, ConditionStatus::True);
        assert_eq!(conditions[0].message, "ok");
        assert_eq!(conditions[1].type_, "Other");
    }

    #[test]
    fn transition_time_kept_when_status_unchanged() {
        let mut old = Condition::new("MachineCreated", ConditionStatus::False, "Failed", "a");
        old.last_transition_time = Utc::now() - Duration::hours(1);
        let then = old.last_transition_time;
        let mut conditions = vec![old];

        set_condition(
            &mut conditions,
            Condition::new("MachineCreated", ConditionStatus::False, "Failed", "b"),
        );
        assert_eq!(conditions[0].last_transition_time, then);
        assert_eq!(conditions[0].message, "b");

        set_condition(
            &mut conditions,
            Condition::new("MachineCreated", ConditionStatus::True, "Succeeded", "c"),
        );
        assert!(conditions[0].last_transition_time > then);
    }

    #[test]
    fn condition_status_display() {
        assert_eq!(ConditionStatus::True.to_string(), "True");
        assert_eq!(ConditionStatus::default(), ConditionStatus::Unknown);
        assert!(find_condition(&[], "MachineCreated").is_none());
    }
}
