//! BMM API data models
//!
//! Request and response bodies for the Carbide REST endpoints the provider
//! calls. JSON field names are camelCase; optional request fields are omitted
//! when unset.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Free-form labels attached to remote resources
pub type Labels = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// VPC
// ---------------------------------------------------------------------------

/// Network virtualization backing a VPC
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkVirtualizationType {
    /// Ethernet virtualizer
    EthernetVirtualizer,
    /// Flat network fabric
    Fnn,
}

/// Body of `POST /vpc`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VpcCreateRequest {
    pub name: String,
    pub site_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_virtualization_type: Option<NetworkVirtualizationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Labels>,
}

/// A VPC
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vpc {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub site_id: Option<Uuid>,
    #[serde(default)]
    pub network_virtualization_type: Option<NetworkVirtualizationType>,
    #[serde(default)]
    pub labels: Option<Labels>,
}

// ---------------------------------------------------------------------------
// IP block
// ---------------------------------------------------------------------------

/// IP protocol of an IP block
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IpBlockProtocolVersion {
    /// IPv4
    #[serde(rename = "IPv4")]
    Ipv4,
}

/// Routing scope of an IP block
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IpBlockRoutingType {
    /// Routable within the datacenter only
    DatacenterOnly,
}

/// Body of `POST /ipblock`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IpBlockCreateRequest {
    pub name: String,
    pub site_id: Uuid,
    pub prefix: String,
    pub prefix_length: u8,
    pub protocol_version: IpBlockProtocolVersion,
    pub routing_type: IpBlockRoutingType,
}

/// An IP block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IpBlock {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub prefix_length: Option<u8>,
}

// ---------------------------------------------------------------------------
// Subnet
// ---------------------------------------------------------------------------

/// Body of `POST /subnet`
///
/// Only the prefix length is sent; BMM picks the network from the IP block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubnetCreateRequest {
    pub name: String,
    pub vpc_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_block_id: Option<Uuid>,
    pub prefix_length: u8,
}

/// A subnet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub vpc_id: Option<Uuid>,
    #[serde(default)]
    pub ipv4_block_id: Option<Uuid>,
    #[serde(default)]
    pub ipv4_prefix: Option<String>,
    #[serde(default)]
    pub prefix_length: Option<u8>,
}

// ---------------------------------------------------------------------------
// Network security group
// ---------------------------------------------------------------------------

/// Traffic direction of an NSG rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleDirection {
    Ingress,
    Egress,
}

/// Protocol matched by an NSG rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleProtocol {
    Tcp,
    Udp,
    Icmp,
    All,
}

/// Action of an NSG rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
}

/// A rule as accepted by BMM
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSecurityGroupRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub direction: RuleDirection,
    pub protocol: RuleProtocol,
    pub action: RuleAction,
    pub source_prefix: String,
    pub destination_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_port_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_port_range: Option<String>,
}

/// Body of `POST /network-security-group`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSecurityGroupCreateRequest {
    pub name: String,
    pub site_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<NetworkSecurityGroupRule>>,
}

/// A network security group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSecurityGroup {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub rules: Vec<NetworkSecurityGroupRule>,
}

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

/// Instance lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstanceStatus {
    Pending,
    Provisioning,
    Ready,
    Error,
    Terminating,
    /// Anything newer than this client knows about
    #[serde(other)]
    Unknown,
}

/// Network interface in an instance create request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceCreateRequest {
    pub subnet_id: Uuid,
    pub is_physical: bool,
}

/// Body of `POST /instance`
///
/// Exactly one of `instance_type_id` and `machine_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstanceCreateRequest {
    pub name: String,
    pub tenant_id: Uuid,
    pub vpc_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_type_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_unhealthy_machine: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    pub interfaces: Vec<InterfaceCreateRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_key_group_ids: Option<Vec<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Labels>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_home_enabled: Option<bool>,
}

/// Body of `DELETE /instance/{id}`
///
/// The default (empty) body is a normal delete. The fields select the
/// repair/replace flow, which the provider never uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDeleteRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_health_issue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_repair_tenant: Option<bool>,
}

/// An interface on a running instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInterface {
    #[serde(default)]
    pub subnet_id: Option<Uuid>,
    #[serde(default)]
    pub is_physical: Option<bool>,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
}

/// An instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub status: Option<InstanceStatus>,
    #[serde(default)]
    pub machine_id: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<InstanceInterface>,
}
