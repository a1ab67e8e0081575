//! Object references shared by the infrastructure CRDs

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a Secret, optionally in another namespace
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Name of the Secret
    pub name: String,

    /// Namespace of the Secret (defaults to the namespace of the referencing resource)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl SecretReference {
    /// Namespace to read the Secret from, falling back to `default_namespace`
    pub fn namespace_or<'a>(&'a self, default_namespace: &'a str) -> &'a str {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => ns,
            _ => default_namespace,
        }
    }
}

/// Reference to a BMM site, either by name or by its UUID
///
/// When both are set the ID wins.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SiteReference {
    /// Site name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Site UUID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Network endpoint of the cluster's API server
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    /// Hostname or IP address
    pub host: String,

    /// Port
    pub port: i32,
}

impl ApiEndpoint {
    /// An endpoint is considered unset while its host is empty
    pub fn is_set(&self) -> bool {
        !self.host.is_empty()
    }
}

/// Address reported for a machine
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct MachineAddress {
    /// Address type
    #[serde(rename = "type")]
    pub address_type: MachineAddressType,

    /// The address itself
    pub address: String,
}

impl MachineAddress {
    /// Build an internal IP address entry
    pub fn internal_ip(address: impl Into<String>) -> Self {
        Self {
            address_type: MachineAddressType::InternalIP,
            address: address.into(),
        }
    }
}

/// Cluster API machine address types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum MachineAddressType {
    /// Hostname
    Hostname,
    /// External IP
    ExternalIP,
    /// Internal IP
    InternalIP,
    /// External DNS name
    ExternalDNS,
    /// Internal DNS name
    InternalDNS,
}
