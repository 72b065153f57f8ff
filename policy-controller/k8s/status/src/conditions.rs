use chrono::{DateTime, Utc};
use gateway_policy_controller_k8s_api::{self as k8s, Condition};
use gateway_policy_controller_k8s_index::{Enforcement, PolicyStatus};

pub(crate) const ACCEPTED: &str = "Accepted";
pub(crate) const ENFORCED: &str = "Enforced";

/// Condition reasons.
pub(crate) mod reasons {
    pub const ACCEPTED: &str = "Accepted";
    pub const TARGET_NOT_FOUND: &str = "TargetNotFound";
    pub const INVALID: &str = "Invalid";
    pub const ENFORCED: &str = "Enforced";
    pub const OVERRIDDEN: &str = "Overridden";
    pub const UNKNOWN: &str = "Unknown";
}

/// Builds the full set of conditions reported for a policy.
pub fn policy_conditions(status: &PolicyStatus, timestamp: DateTime<Utc>) -> Vec<Condition> {
    vec![accepted(status, timestamp), enforced(status, timestamp)]
}

pub fn accepted(status: &PolicyStatus, timestamp: DateTime<Utc>) -> Condition {
    match status {
        PolicyStatus::Accepted { .. } => condition(
            ACCEPTED,
            true,
            reasons::ACCEPTED,
            "Policy has been accepted".to_string(),
            timestamp,
        ),
        PolicyStatus::TargetNotFound => condition(
            ACCEPTED,
            false,
            reasons::TARGET_NOT_FOUND,
            "Policy target was not found".to_string(),
            timestamp,
        ),
        PolicyStatus::Invalid(error) => condition(
            ACCEPTED,
            false,
            reasons::INVALID,
            format!("Policy is invalid: {error}"),
            timestamp,
        ),
    }
}

pub fn enforced(status: &PolicyStatus, timestamp: DateTime<Utc>) -> Condition {
    match status {
        PolicyStatus::Accepted {
            enforcement: Enforcement::Enforced,
        } => condition(
            ENFORCED,
            true,
            reasons::ENFORCED,
            "Policy has been successfully enforced".to_string(),
            timestamp,
        ),
        PolicyStatus::Accepted {
            enforcement: Enforcement::Overridden,
        } => condition(
            ENFORCED,
            false,
            reasons::OVERRIDDEN,
            "Policy is overridden by other policies".to_string(),
            timestamp,
        ),
        PolicyStatus::Accepted {
            enforcement: Enforcement::Unknown,
        } => condition(
            ENFORCED,
            false,
            reasons::UNKNOWN,
            "Policy does not apply to any route".to_string(),
            timestamp,
        ),
        PolicyStatus::TargetNotFound | PolicyStatus::Invalid(_) => condition(
            ENFORCED,
            false,
            reasons::UNKNOWN,
            "Policy has not been accepted".to_string(),
            timestamp,
        ),
    }
}

fn condition(
    type_: &str,
    status: bool,
    reason: &str,
    message: String,
    timestamp: DateTime<Utc>,
) -> Condition {
    Condition {
        last_transition_time: k8s::Time(timestamp),
        message,
        observed_generation: None,
        reason: reason.to_string(),
        status: if status { "True" } else { "False" }.to_string(),
        type_: type_.to_string(),
    }
}
