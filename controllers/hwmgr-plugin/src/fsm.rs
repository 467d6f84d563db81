//! NodePool state classification.
//!
//! There is no stored state field: the NodePool's condition list is the
//! state. `determine_action` is pure and total over that list, so it is
//! tested directly against literal condition fixtures.

use crate::conditions::find_status_condition;
use crds::{ConditionReason, ConditionStatus, ConditionType, NodePool};
use kube_runtime::controller::Action;
use std::time::Duration;

/// Requeue interval while waiting on a backend job
pub const SHORT_REQUEUE_INTERVAL: Duration = Duration::from_secs(15);

/// Requeue interval while a backend is unreachable
pub const MEDIUM_REQUEUE_INTERVAL: Duration = Duration::from_secs(60);

/// What a reconciliation pass should do with a NodePool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePoolAction {
    /// No conditions yet: allocate every requested group
    Create,
    /// Allocation in flight: poll and advance it
    Processing,
    /// Generation moved past the last reconciled spec
    SpecChanged,
    /// Allocation failed; waits for a spec change
    Failed,
    /// Provisioned and up to date
    Noop,
}

/// Classifies a NodePool from its conditions.
///
/// Priority: an empty list is Create; a True Provisioned condition is
/// SpecChanged when generations drift and Noop otherwise; a Failed reason is
/// terminal unless the spec changed since the failure was recorded; any
/// other Provisioned condition is Processing. A list without a Provisioned
/// condition is left alone.
pub fn determine_action(nodepool: &NodePool) -> NodePoolAction {
    let conditions = nodepool.conditions();
    if conditions.is_empty() {
        return NodePoolAction::Create;
    }

    let Some(provisioned) = find_status_condition(conditions, ConditionType::Provisioned) else {
        return NodePoolAction::Noop;
    };

    let spec_drifted = nodepool.generation() != nodepool.observed_generation();

    if provisioned.status == ConditionStatus::True {
        if spec_drifted {
            return NodePoolAction::SpecChanged;
        }
        return NodePoolAction::Noop;
    }

    if provisioned.reason == ConditionReason::Failed.as_str() {
        if spec_drifted {
            return NodePoolAction::SpecChanged;
        }
        return NodePoolAction::Failed;
    }

    NodePoolAction::Processing
}

/// Wait for the next change event
pub fn do_not_requeue() -> Action {
    Action::await_change()
}

pub fn requeue_with_short_interval() -> Action {
    Action::requeue(SHORT_REQUEUE_INTERVAL)
}

pub fn requeue_with_medium_interval() -> Action {
    Action::requeue(MEDIUM_REQUEUE_INTERVAL)
}
