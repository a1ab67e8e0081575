//! NvidiaBMMCluster Custom Resource Definition
//!
//! Declares the network topology of a workload cluster on an NVIDIA BMM site:
//! one VPC, one IP block, a set of subnets and an optional network security
//! group. The controller records the remote identifiers it creates in status.

use crate::conditions::Condition;
use crate::references::{ApiEndpoint, SecretReference, SiteReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// NvidiaBMMClusterSpec defines the desired network topology of a cluster
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "NvidiaBMMCluster",
    namespaced,
    status = "NvidiaBMMClusterStatus",
    shortname = "bmmcluster",
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"VPC","type":"string","jsonPath":".status.vpcID"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NvidiaBMMClusterSpec {
    /// Site the cluster lives in
    #[schemars(extend("x-kubernetes-validations" = [{"rule": "self == oldSelf", "message": "siteRef is immutable"}]))]
    pub site_ref: SiteReference,

    /// Tenant UUID owning the cluster resources
    #[serde(rename = "tenantID")]
    #[schemars(extend("x-kubernetes-validations" = [{"rule": "self == oldSelf", "message": "tenantID is immutable"}]))]
    pub tenant_id: String,

    /// VPC configuration
    pub vpc: VpcSpec,

    /// Subnets to create inside the VPC (names unique within the cluster)
    #[schemars(length(min = 1))]
    pub subnets: Vec<SubnetSpec>,

    /// Endpoint of the cluster's API server, adopted from the first ready control-plane machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,

    /// Credentials used to talk to the BMM API
    pub authentication: AuthenticationSpec,
}

/// VPC configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VpcSpec {
    /// VPC name
    pub name: String,

    /// Network virtualization type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_virtualization_type: Option<NetworkVirtualizationType>,

    /// Labels applied to the VPC
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Optional network security group for the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_security_group: Option<NetworkSecurityGroupSpec>,
}

/// Network virtualization backing a VPC
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkVirtualizationType {
    /// Ethernet virtualizer
    EthernetVirtualizer,
    /// Flat network fabric
    Fnn,
}

/// Network security group configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSecurityGroupSpec {
    /// NSG name
    pub name: String,

    /// Ordered rules
    #[serde(default)]
    pub rules: Vec<NetworkSecurityGroupRule>,
}

/// A single NSG rule as written by the user
///
/// Direction, protocol and action are free-form here and translated to the
/// values the BMM API accepts during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSecurityGroupRule {
    /// Rule name
    pub name: String,

    /// ingress or egress
    pub direction: String,

    /// tcp, udp, icmp or all
    pub protocol: String,

    /// Destination port or range (e.g. "6443" or "30000-32767")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_range: Option<String>,

    /// Source prefix, any when unset
    #[serde(rename = "sourceCIDR", default, skip_serializing_if = "Option::is_none")]
    pub source_cidr: Option<String>,

    /// Destination prefix, any when unset
    #[serde(rename = "destinationCIDR", default, skip_serializing_if = "Option::is_none")]
    pub destination_cidr: Option<String>,

    /// allow or deny
    pub action: String,
}

/// Subnet configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    /// Subnet name, unique within the cluster
    pub name: String,

    /// Subnet CIDR; only the prefix length is sent to BMM
    pub cidr: String,

    /// Role of the machines placed in this subnet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<SubnetRole>,
}

/// Role of a subnet
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SubnetRole {
    /// Control-plane machines
    ControlPlane,
    /// Worker machines
    Worker,
}

/// Where the BMM credentials live
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationSpec {
    /// Secret holding the `endpoint`, `orgName` and `token` keys
    pub secret_ref: SecretReference,
}

/// Observed state of an NvidiaBMMCluster
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NvidiaBMMClusterStatus {
    /// True once every network resource exists
    #[serde(default)]
    pub ready: bool,

    /// BMM VPC ID
    #[serde(rename = "vpcID", default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,

    /// Remote network identifiers
    #[serde(default)]
    pub network_status: NetworkStatus,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Remote network identifiers owned by the cluster
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    /// Subnet name to BMM subnet ID
    #[serde(rename = "subnetIDs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subnet_ids: BTreeMap<String, String>,

    /// BMM network security group ID
    #[serde(rename = "nsgID", default, skip_serializing_if = "Option::is_none")]
    pub nsg_id: Option<String>,

    /// BMM IP block ID the subnets are carved from
    #[serde(rename = "ipBlockID", default, skip_serializing_if = "Option::is_none")]
    pub ip_block_id: Option<String>,
}

impl NvidiaBMMCluster {
    /// Whether the controller has marked the cluster network ready
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.ready)
    }

    /// Whether a control-plane endpoint host has been recorded
    pub fn has_control_plane_endpoint(&self) -> bool {
        self.spec
            .control_plane_endpoint
            .as_ref()
            .is_some_and(ApiEndpoint::is_set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_uses_upstream_field_names() {
        let mut status = NvidiaBMMClusterStatus {
            ready: true,
            vpc_id: Some("vpc-1".to_string()),
            ..Default::default()
        };
        status.network_status.subnet_ids.insert("cp".to_string(), "sub-1".to_string());
        status.network_status.ip_block_id = Some("blk-1".to_string());

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["vpcID"], "vpc-1");
        assert_eq!(json["networkStatus"]["subnetIDs"]["cp"], "sub-1");
        assert_eq!(json["networkStatus"]["ipBlockID"], "blk-1");
        assert!(json["networkStatus"].get("nsgID").is_none());
    }

    #[test]
    fn test_spec_deserializes_from_manifest_shape() {
        let spec: NvidiaBMMClusterSpec = serde_json::from_value(serde_json::json!({
            "siteRef": {"id": "8a6f3c1e-4b59-4d0e-9a38-6a3f0f2f1c11"},
            "tenantID": "tenant-a",
            "vpc": {
                "name": "vpc-a",
                "networkVirtualizationType": "ETHERNET_VIRTUALIZER",
                "networkSecurityGroup": {
                    "name": "nsg-a",
                    "rules": [{"name": "api", "direction": "Ingress", "protocol": "TCP", "portRange": "6443", "action": "Allow"}]
                }
            },
            "subnets": [{"name": "cp", "cidr": "10.0.1.0/24", "role": "control-plane"}],
            "authentication": {"secretRef": {"name": "bmm-creds"}}
        }))
        .unwrap();

        assert_eq!(spec.vpc.network_virtualization_type, Some(NetworkVirtualizationType::EthernetVirtualizer));
        assert_eq!(spec.subnets[0].role, Some(SubnetRole::ControlPlane));
        assert_eq!(spec.vpc.network_security_group.unwrap().rules[0].port_range.as_deref(), Some("6443"));
        assert!(spec.control_plane_endpoint.is_none());
    }
}
