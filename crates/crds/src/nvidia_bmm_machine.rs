//! NvidiaBMMMachine Custom Resource Definition
//!
//! One bare-metal instance on an NVIDIA BMM site, backing one Cluster API
//! `Machine`.

use crate::conditions::Condition;
use crate::references::MachineAddress;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// NvidiaBMMMachineSpec defines the desired instance
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "NvidiaBMMMachine",
    namespaced,
    status = "NvidiaBMMMachineStatus",
    shortname = "bmmmachine",
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.instanceState"}"#,
    printcolumn = r#"{"name":"ProviderID","type":"string","jsonPath":".spec.providerID"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NvidiaBMMMachineSpec {
    /// Set by the controller once the instance exists
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// How the instance is allocated
    pub instance_type: InstanceTypeSpec,

    /// Network attachment
    pub network: MachineNetworkSpec,

    /// SSH key group UUIDs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_key_groups: Vec<String>,

    /// Labels applied to the instance
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Instance allocation: by instance type, or pinned to a specific machine
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
#[schemars(extend("x-kubernetes-validations" = [{"rule": "has(self.id) != has(self.machineID)", "message": "exactly one of id or machineID must be set"}]))]
pub struct InstanceTypeSpec {
    /// Instance type UUID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Specific machine ID
    #[serde(rename = "machineID", default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,

    /// Accept a machine BMM reports unhealthy (only with machineID)
    #[serde(default)]
    pub allow_unhealthy_machine: bool,
}

/// Network attachment of the instance
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MachineNetworkSpec {
    /// Name of the cluster subnet for the primary interface
    pub subnet_name: String,

    /// Extra interfaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_interfaces: Vec<AdditionalInterface>,
}

/// An extra network interface
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalInterface {
    /// Name of the cluster subnet
    pub subnet_name: String,

    /// Attach as a physical interface
    #[serde(default)]
    pub is_physical: bool,
}

/// Instance lifecycle state as reported by BMM
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum InstanceState {
    /// Accepted, not yet scheduled
    Pending,
    /// Being installed
    Provisioning,
    /// Running and reachable
    Ready,
    /// Failed
    Error,
    /// Being torn down
    Terminating,
    /// Any value this controller does not know
    Unknown,
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Provisioning => "Provisioning",
            Self::Ready => "Ready",
            Self::Error => "Error",
            Self::Terminating => "Terminating",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Observed state of an NvidiaBMMMachine
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NvidiaBMMMachineStatus {
    /// True once the instance is Ready
    #[serde(default)]
    pub ready: bool,

    /// BMM instance ID
    #[serde(rename = "instanceID", default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// Physical machine the instance landed on
    #[serde(rename = "machineID", default, skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,

    /// Last observed instance state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_state: Option<InstanceState>,

    /// Addresses discovered on the instance
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<MachineAddress>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
