//! Generic Cluster API records
//!
//! Only the fields this provider reads or patches are modelled. Unknown
//! fields are ignored on read, and writes are always partial merge patches,
//! so nothing else on these objects is ever overwritten.

use crate::references::MachineAddress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Cluster API core group
pub const CLUSTER_API_GROUP: &str = "cluster.x-k8s.io";

/// Label carrying the owning cluster's name
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Label present on control-plane machines
pub const MACHINE_CONTROL_PLANE_LABEL: &str = "cluster.x-k8s.io/control-plane";

/// Annotation pausing reconciliation of a single object
pub const PAUSED_ANNOTATION: &str = "cluster.x-k8s.io/paused";

/// Cluster API Cluster (partial)
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, Default)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta2",
    kind = "Cluster",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Pauses reconciliation of the cluster and everything it owns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,

    /// Reference to the infrastructure cluster (an NvidiaBMMCluster)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<ContractVersionedObjectReference>,
}

/// Cluster API Machine (partial)
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, Default)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta2",
    kind = "Machine",
    namespaced,
    status = "MachineStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Name of the owning Cluster
    #[serde(default)]
    pub cluster_name: String,

    /// Bootstrap configuration
    #[serde(default)]
    pub bootstrap: Bootstrap,

    /// Reference to the infrastructure machine (an NvidiaBMMMachine)
    #[serde(default)]
    pub infrastructure_ref: ContractVersionedObjectReference,

    /// Provider ID mirrored from the infrastructure machine
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// Bootstrap data reference of a Machine
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bootstrap {
    /// Secret holding the bootstrap payload under the `value` key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_secret_name: Option<String>,
}

/// Observed state of a Machine (partial)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Addresses mirrored from the infrastructure machine
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<MachineAddress>,
}

/// v1beta2 object reference (same namespace as the referrer)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContractVersionedObjectReference {
    /// API group of the referenced object
    #[serde(default)]
    pub api_group: String,

    /// Kind of the referenced object
    #[serde(default)]
    pub kind: String,

    /// Name of the referenced object
    #[serde(default)]
    pub name: String,
}

impl Machine {
    /// Control-plane membership is signalled by the presence of the label
    pub fn is_control_plane(&self) -> bool {
        self.metadata
            .labels
            .as_ref()
            .is_some_and(|labels| labels.contains_key(MACHINE_CONTROL_PLANE_LABEL))
    }

    /// Name of the bootstrap data secret, if the bootstrap provider has produced one
    pub fn bootstrap_data_secret_name(&self) -> Option<&str> {
        self.spec
            .bootstrap
            .data_secret_name
            .as_deref()
            .filter(|name| !name.is_empty())
    }
}

/// Name of the owner with the given Cluster API kind, if any
pub fn owner_name<'a>(meta: &'a ObjectMeta, kind: &str) -> Option<&'a str> {
    meta.owner_references.as_ref()?.iter().find_map(|owner| {
        let group = owner.api_version.split('/').next().unwrap_or_default();
        (owner.kind == kind && group == CLUSTER_API_GROUP).then_some(owner.name.as_str())
    })
}

/// Cluster name from the well-known label
pub fn cluster_name_label(meta: &ObjectMeta) -> Option<&str> {
    meta.labels
        .as_ref()?
        .get(CLUSTER_NAME_LABEL)
        .map(String::as_str)
        .filter(|name| !name.is_empty())
}

/// True when either the Cluster is paused or the object carries the paused annotation
pub fn is_paused(cluster: &Cluster, meta: &ObjectMeta) -> bool {
    cluster.spec.paused.unwrap_or(false)
        || meta
            .annotations
            .as_ref()
            .is_some_and(|annotations| annotations.contains_key(PAUSED_ANNOTATION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use std::collections::BTreeMap;

    fn owner(api_version: &str, kind: &str, name: &str) -> OwnerReference {
        OwnerReference {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: "uid".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_owner_name_matches_group_and_kind() {
        let meta = ObjectMeta {
            owner_references: Some(vec![
                owner("apps/v1", "Machine", "wrong-group"),
                owner("cluster.x-k8s.io/v1beta2", "Machine", "m-0"),
            ]),
            ..Default::default()
        };
        assert_eq!(owner_name(&meta, "Machine"), Some("m-0"));
        assert_eq!(owner_name(&meta, "Cluster"), None);
        assert_eq!(owner_name(&ObjectMeta::default(), "Machine"), None);
    }

    #[test]
    fn test_is_paused() {
        let mut cluster = Cluster::new("c", ClusterSpec::default());
        let mut meta = ObjectMeta::default();
        assert!(!is_paused(&cluster, &meta));

        meta.annotations = Some(BTreeMap::from([(PAUSED_ANNOTATION.to_string(), String::new())]));
        assert!(is_paused(&cluster, &meta));

        cluster.spec.paused = Some(true);
        assert!(is_paused(&cluster, &ObjectMeta::default()));
    }

    #[test]
    fn test_control_plane_label_presence() {
        let mut machine = Machine::new("m", MachineSpec::default());
        assert!(!machine.is_control_plane());
        machine.metadata.labels = Some(BTreeMap::from([(MACHINE_CONTROL_PLANE_LABEL.to_string(), String::new())]));
        assert!(machine.is_control_plane());
    }

    #[test]
    fn test_bootstrap_secret_name_ignores_empty() {
        let mut machine = Machine::new("m", MachineSpec::default());
        assert_eq!(machine.bootstrap_data_secret_name(), None);
        machine.spec.bootstrap.data_secret_name = Some(String::new());
        assert_eq!(machine.bootstrap_data_secret_name(), None);
        machine.spec.bootstrap.data_secret_name = Some("m-bootstrap".to_string());
        assert_eq!(machine.bootstrap_data_secret_name(), Some("m-bootstrap"));
    }
}
