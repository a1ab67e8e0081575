//! Status conditions
//!
//! Kubernetes-style conditions used by both infrastructure resources, plus the
//! condition types and reasons the controllers report.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Overall readiness of the resource
pub const READY_CONDITION: &str = "Ready";
/// The cluster VPC exists remotely
pub const VPC_READY_CONDITION: &str = "VPCReady";
/// Every declared subnet exists remotely
pub const SUBNETS_READY_CONDITION: &str = "SubnetsReady";
/// The requested network security group exists remotely
pub const NSG_READY_CONDITION: &str = "NSGReady";
/// The machine's instance has been created
pub const INSTANCE_PROVISIONED_CONDITION: &str = "InstanceProvisioned";
/// Addresses have been discovered for the machine
pub const NETWORK_CONFIGURED_CONDITION: &str = "NetworkConfigured";

/// Condition reasons
pub mod reasons {
    /// Remote resource exists and is usable
    pub const PROVISIONED: &str = "Provisioned";
    /// Site reference could not be resolved
    pub const SITE_NOT_FOUND: &str = "SiteNotFound";
    /// Credentials secret missing or incomplete
    pub const CREDENTIALS_INVALID: &str = "CredentialsInvalid";
    /// Spec value the controller cannot use
    pub const INVALID_CONFIGURATION: &str = "InvalidConfiguration";
    /// VPC create or lookup failed
    pub const VPC_CREATION_FAILED: &str = "VPCCreationFailed";
    /// IP block create or lookup failed
    pub const IP_BLOCK_CREATION_FAILED: &str = "IPBlockCreationFailed";
    /// Subnet create or lookup failed
    pub const SUBNET_CREATION_FAILED: &str = "SubnetCreationFailed";
    /// NSG create or lookup failed
    pub const NSG_CREATION_FAILED: &str = "NSGCreationFailed";
    /// Instance create failed
    pub const INSTANCE_CREATION_FAILED: &str = "InstanceCreationFailed";
    /// Instance lookup failed
    pub const INSTANCE_QUERY_FAILED: &str = "InstanceQueryFailed";
    /// Cached instance no longer exists remotely
    pub const INSTANCE_NOT_FOUND: &str = "InstanceNotFound";
    /// Instance exists but has not reached Ready
    pub const INSTANCE_NOT_READY: &str = "InstanceNotReady";
    /// Some reconcile step failed
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
    /// Addresses reported by the instance
    pub const ADDRESSES_ASSIGNED: &str = "AddressesAssigned";
    /// Remote cleanup failed during deletion
    pub const DELETION_FAILED: &str = "DeletionFailed";
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
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

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready, VPCReady)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
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

    /// Shorthand for a `True` condition
    pub fn true_(type_: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(type_, ConditionStatus::True, reason, "")
    }

    /// Shorthand for a `False` condition with a message
    pub fn false_(
        type_: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(type_, ConditionStatus::False, reason, message)
    }
}

/// Insert or replace a condition by type.
///
/// The transition time of an existing condition is kept when its status does
/// not change, so repeated passes do not churn the status.
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

/// True when the condition exists and its status is `True`
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_).is_some_and(|c| c.status == ConditionStatus::True)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_appends_new_type() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, Condition::true_(VPC_READY_CONDITION, reasons::PROVISIONED));
        set_condition(&mut conditions, Condition::false_(SUBNETS_READY_CONDITION, reasons::SUBNET_CREATION_FAILED, "boom"));

        assert_eq!(conditions.len(), 2);
        assert!(is_condition_true(&conditions, VPC_READY_CONDITION));
        assert!(!is_condition_true(&conditions, SUBNETS_READY_CONDITION));
        assert!(!is_condition_true(&conditions, NSG_READY_CONDITION));
    }

    #[test]
    fn test_set_condition_keeps_transition_time_when_status_unchanged() {
        let mut conditions = Vec::new();
        let mut first = Condition::true_(READY_CONDITION, reasons::PROVISIONED);
        first.last_transition_time = DateTime::<Utc>::from_timestamp(1_000, 0).unwrap();
        set_condition(&mut conditions, first.clone());

        set_condition(&mut conditions, Condition::new(READY_CONDITION, ConditionStatus::True, "Other", "msg"));

        let ready = find_condition(&conditions, READY_CONDITION).unwrap();
        assert_eq!(ready.last_transition_time, first.last_transition_time);
        assert_eq!(ready.reason, "Other");
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_set_condition_updates_transition_time_on_flip() {
        let mut conditions = Vec::new();
        let mut first = Condition::true_(READY_CONDITION, reasons::PROVISIONED);
        first.last_transition_time = DateTime::<Utc>::from_timestamp(1_000, 0).unwrap();
        set_condition(&mut conditions, first.clone());

        set_condition(&mut conditions, Condition::false_(READY_CONDITION, reasons::RECONCILE_FAILED, "down"));

        let ready = find_condition(&conditions, READY_CONDITION).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_ne!(ready.last_transition_time, first.last_transition_time);
    }

    #[test]
    fn test_condition_serializes_kubernetes_field_names() {
        let condition = Condition::false_(NSG_READY_CONDITION, reasons::NSG_CREATION_FAILED, "denied");
        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(json["type"], "NSGReady");
        assert_eq!(json["status"], "False");
        assert!(json.get("lastTransitionTime").is_some());
    }
}
