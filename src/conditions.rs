//! Operator status condition helpers
//!
//! Provides the condition type, the condition type/status constants the
//! operator reports, and the helpers used to merge conditions into a
//! persisted status following the Kubernetes API conventions.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::KubeStorageVersionMigratorStatus;
use crate::error::Result;

// Condition status values
pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";
pub const CONDITION_UNKNOWN: &str = "Unknown";

// Operator condition types
pub const CONDITION_AVAILABLE: &str = "Available";
pub const CONDITION_PROGRESSING: &str = "Progressing";
pub const CONDITION_TARGET_DEGRADED: &str = "TargetDegraded";

/// A single operator condition as persisted in the custom resource status.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperatorCondition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last time the condition transitioned
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Machine readable reason
    #[serde(default)]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

impl OperatorCondition {
    /// Build a condition without reason or message.
    pub fn new(condition_type: &str, status: &str) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: status.to_string(),
            last_transition_time: None,
            reason: None,
            message: None,
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Set or update a condition in a list, preserving lastTransitionTime when status hasn't changed.
pub fn set_operator_condition(conditions: &mut Vec<OperatorCondition>, new: OperatorCondition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == new.r#type) {
        if existing.status != new.status {
            existing.status = new.status;
            existing.last_transition_time = Some(Utc::now().to_rfc3339());
        }
        existing.reason = new.reason;
        existing.message = new.message;
    } else {
        let mut new = new;
        if new.last_transition_time.is_none() {
            new.last_transition_time = Some(Utc::now().to_rfc3339());
        }
        conditions.push(new);
    }
}

pub fn find_condition<'a>(
    conditions: &'a [OperatorCondition],
    condition_type: &str,
) -> Option<&'a OperatorCondition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

pub fn is_operator_condition_true(conditions: &[OperatorCondition], condition_type: &str) -> bool {
    is_operator_condition_present_and_equal(conditions, condition_type, CONDITION_TRUE)
}

pub fn is_operator_condition_false(conditions: &[OperatorCondition], condition_type: &str) -> bool {
    is_operator_condition_present_and_equal(conditions, condition_type, CONDITION_FALSE)
}

fn is_operator_condition_present_and_equal(
    conditions: &[OperatorCondition],
    condition_type: &str,
    status: &str,
) -> bool {
    find_condition(conditions, condition_type).is_some_and(|c| c.status == status)
}

/// Mutator applied by the status writer to a freshly read status.
pub type UpdateStatusFn = Box<dyn Fn(&mut KubeStorageVersionMigratorStatus) -> Result<()> + Send + Sync>;

/// Returns a status mutator that merges `condition` into the status conditions.
pub fn update_condition_fn(condition: OperatorCondition) -> UpdateStatusFn {
    Box::new(move |status: &mut KubeStorageVersionMigratorStatus| {
        set_operator_condition(&mut status.conditions, condition.clone());
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition_at(condition_type: &str, status: &str, time: &str) -> OperatorCondition {
        OperatorCondition {
            r#type: condition_type.to_string(),
            status: status.to_string(),
            last_transition_time: Some(time.to_string()),
            reason: Some("First".to_string()),
            message: Some("first".to_string()),
        }
    }

    #[test]
    fn test_builder() {
        let cond = OperatorCondition::new(CONDITION_AVAILABLE, CONDITION_FALSE)
            .with_reason("NoDeployment")
            .with_message("missing");
        assert_eq!(cond.r#type, "Available");
        assert_eq!(cond.status, "False");
        assert!(cond.last_transition_time.is_none());
        assert_eq!(cond.reason.as_deref(), Some("NoDeployment"));
        assert_eq!(cond.message.as_deref(), Some("missing"));
    }

    #[test]
    fn test_set_condition_adds_new_with_time() {
        let mut conditions = Vec::new();
        set_operator_condition(
            &mut conditions,
            OperatorCondition::new(CONDITION_PROGRESSING, CONDITION_FALSE),
        );
        assert_eq!(conditions.len(), 1);
        assert!(conditions[0].last_transition_time.is_some());
    }

    #[test]
    fn test_set_condition_preserves_transition_time_on_same_status() {
        let mut conditions = vec![condition_at("Available", CONDITION_TRUE, "2024-01-01T00:00:00Z")];

        set_operator_condition(
            &mut conditions,
            OperatorCondition::new("Available", CONDITION_TRUE).with_reason("Second"),
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
        assert_eq!(conditions[0].reason.as_deref(), Some("Second"));
        // Message is cleared when the new condition carries none
        assert!(conditions[0].message.is_none());
    }

    #[test]
    fn test_set_condition_updates_transition_time_on_status_change() {
        let mut conditions = vec![condition_at("Available", CONDITION_FALSE, "2024-01-01T00:00:00Z")];

        set_operator_condition(
            &mut conditions,
            OperatorCondition::new("Available", CONDITION_TRUE),
        );

        assert_eq!(conditions[0].status, CONDITION_TRUE);
        assert_ne!(
            conditions[0].last_transition_time.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_true_false_helpers() {
        let conditions = vec![
            OperatorCondition::new(CONDITION_AVAILABLE, CONDITION_TRUE),
            OperatorCondition::new(CONDITION_PROGRESSING, CONDITION_UNKNOWN),
        ];
        assert!(is_operator_condition_true(&conditions, CONDITION_AVAILABLE));
        assert!(!is_operator_condition_false(&conditions, CONDITION_AVAILABLE));
        assert!(!is_operator_condition_true(&conditions, CONDITION_PROGRESSING));
        assert!(!is_operator_condition_false(&conditions, CONDITION_PROGRESSING));
        // Absent conditions are neither true nor false
        assert!(!is_operator_condition_true(&conditions, CONDITION_TARGET_DEGRADED));
        assert!(!is_operator_condition_false(&conditions, CONDITION_TARGET_DEGRADED));
    }

    #[test]
    fn test_update_condition_fn_merges_into_status() {
        let mut status = KubeStorageVersionMigratorStatus::default();
        let mutator = update_condition_fn(
            OperatorCondition::new(CONDITION_TARGET_DEGRADED, CONDITION_TRUE).with_reason("SyncError"),
        );
        mutator(&mut status).unwrap();
        mutator(&mut status).unwrap();
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].reason.as_deref(), Some("SyncError"));
    }

    #[test]
    fn test_condition_serializes_camel_case() {
        let cond = condition_at("Available", CONDITION_TRUE, "2024-01-01T00:00:00Z");
        let json = serde_json::to_value(&cond).unwrap();
        assert_eq!(json["type"], "Available");
        assert_eq!(json["lastTransitionTime"], "2024-01-01T00:00:00Z");
    }
}
