//! Status condition ledger.
//!
//! Append/replace semantics over an ordered condition list. Lookup is by
//! type, never by position, and insertion order is preserved.

use chrono::Utc;
use crds::{Condition, ConditionStatus};

/// Sets the condition of the given type.
///
/// - absent: appended with a fresh transition time
/// - Status or Reason changed: replaced in place, transition time refreshed
/// - otherwise: only the message is updated, transition time kept
///
/// Returns whether the list changed.
pub fn set_status_condition(
    conditions: &mut Vec<Condition>,
    condition_type: impl AsRef<str>,
    reason: impl AsRef<str>,
    status: ConditionStatus,
    message: impl Into<String>,
) -> bool {
    let condition_type = condition_type.as_ref();
    let reason = reason.as_ref();
    let message = message.into();

    match conditions.iter_mut().find(|c| c.type_ == condition_type) {
        None => {
            conditions.push(Condition {
                type_: condition_type.to_string(),
                status,
                reason: reason.to_string(),
                message,
                last_transition_time: Utc::now(),
            });
            true
        }
        Some(existing) if existing.status != status || existing.reason != reason => {
            existing.status = status;
            existing.reason = reason.to_string();
            existing.message = message;
            existing.last_transition_time = Utc::now();
            true
        }
        Some(existing) => {
            if existing.message == message {
                return false;
            }
            existing.message = message;
            true
        }
    }
}

pub fn find_status_condition<'a>(conditions: &'a [Condition], condition_type: impl AsRef<str>) -> Option<&'a Condition> {
    let condition_type = condition_type.as_ref();
    conditions.iter().find(|c| c.type_ == condition_type)
}

pub fn is_status_condition_true(conditions: &[Condition], condition_type: impl AsRef<str>) -> bool {
    find_status_condition(conditions, condition_type).is_some_and(|c| c.status == ConditionStatus::True)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use crds::{ConditionReason, ConditionType};

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("valid timestamp")
    }

    fn condition(type_: &str, status: ConditionStatus, reason: &str) -> Condition {
        Condition {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message: String::new(),
            last_transition_time: fixed_time(),
        }
    }

    #[test]
    fn test_set_appends_missing_condition() {
        let mut conditions = Vec::new();
        let changed = set_status_condition(
            &mut conditions,
            ConditionType::Provisioned,
            ConditionReason::InProgress,
            ConditionStatus::False,
            "Allocating",
        );

        assert!(changed);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].type_, "Provisioned");
        assert_eq!(conditions[0].reason, "InProgress");
        assert_eq!(conditions[0].message, "Allocating");
    }

    #[test]
    fn test_identical_set_keeps_timestamp() {
        let mut conditions = vec![condition("Provisioned", ConditionStatus::False, "InProgress")];
        conditions[0].message = "Allocating".to_string();

        let changed = set_status_condition(
            &mut conditions,
            ConditionType::Provisioned,
            ConditionReason::InProgress,
            ConditionStatus::False,
            "Allocating",
        );
        assert!(!changed);

        let changed = set_status_condition(
            &mut conditions,
            ConditionType::Provisioned,
            ConditionReason::InProgress,
            ConditionStatus::False,
            "Allocating",
        );
        assert!(!changed);
        assert_eq!(conditions[0].last_transition_time, fixed_time());
    }

    #[test]
    fn test_message_only_change_keeps_timestamp() {
        let mut conditions = vec![condition("Provisioned", ConditionStatus::False, "InProgress")];

        let changed = set_status_condition(
            &mut conditions,
            ConditionType::Provisioned,
            ConditionReason::InProgress,
            ConditionStatus::False,
            "2 of 3 nodes ready",
        );

        assert!(changed);
        assert_eq!(conditions[0].message, "2 of 3 nodes ready");
        assert_eq!(conditions[0].last_transition_time, fixed_time());
    }

    #[test]
    fn test_transition_replaces_in_place() {
        let mut conditions = vec![
            condition("Validation", ConditionStatus::True, "Completed"),
            condition("Provisioned", ConditionStatus::False, "InProgress"),
            condition("Configured", ConditionStatus::True, "ConfigApplied"),
        ];

        let changed = set_status_condition(
            &mut conditions,
            ConditionType::Provisioned,
            ConditionReason::Completed,
            ConditionStatus::True,
            "Created",
        );

        assert!(changed);
        let types: Vec<_> = conditions.iter().map(|c| c.type_.as_str()).collect();
        assert_eq!(types, vec!["Validation", "Provisioned", "Configured"]);
        assert_eq!(conditions[1].status, ConditionStatus::True);
        assert_eq!(conditions[1].reason, "Completed");
        assert!(conditions[1].last_transition_time > fixed_time());
        assert_eq!(conditions[0].last_transition_time, fixed_time());
        assert_eq!(conditions[2].last_transition_time, fixed_time());
    }

    #[test]
    fn test_reason_change_alone_is_a_transition() {
        let mut conditions = vec![condition("Provisioned", ConditionStatus::False, "InProgress")];

        set_status_condition(
            &mut conditions,
            ConditionType::Provisioned,
            ConditionReason::Failed,
            ConditionStatus::False,
            "no hosts",
        );

        assert_eq!(conditions[0].reason, "Failed");
        assert!(conditions[0].last_transition_time > fixed_time());
    }

    #[test]
    fn test_find_conditions() {
        let conditions = vec![
            condition("Provisioned", ConditionStatus::True, "Completed"),
            condition("Configured", ConditionStatus::False, "InProgress"),
        ];

        assert!(is_status_condition_true(&conditions, ConditionType::Provisioned));
        assert!(!is_status_condition_true(&conditions, ConditionType::Configured));
        assert!(!is_status_condition_true(&conditions, ConditionType::Validation));
        assert_eq!(
            find_status_condition(&conditions, "Configured").map(|c| c.reason.as_str()),
            Some("InProgress")
        );
        assert!(find_status_condition(&conditions, ConditionType::Validation).is_none());
    }
}
