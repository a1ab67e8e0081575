//! Test utilities for unit testing reconcilers
//!
//! Builders for the provider's resources and their Cluster API owners, plus
//! an in-memory [`SecretReader`].

use crate::error::ControllerError;
use crate::secrets::{SecretData, SecretReader};
use async_trait::async_trait;
use crds::capi::{self, ContractVersionedObjectReference};
use crds::*;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

pub const CLUSTER_NAMESPACE: &str = "capi";
pub const TEST_SITE_ID: &str = "8a6f3c1e-4b59-4d0e-9a38-6a3f0f2f1c11";
pub const TEST_TENANT_ID: &str = "2f1d7c9a-0b3e-4e55-8d71-5c2a9e4b6f30";

/// Helper to create a test NvidiaBMMCluster with two subnets and no status
pub fn create_test_cluster(name: &str, namespace: &str) -> NvidiaBMMCluster {
    NvidiaBMMCluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: NvidiaBMMClusterSpec {
            site_ref: SiteReference {
                name: None,
                id: Some(TEST_SITE_ID.to_string()),
            },
            tenant_id: TEST_TENANT_ID.to_string(),
            vpc: VpcSpec {
                name: format!("{}-vpc", name),
                ..Default::default()
            },
            subnets: vec![
                SubnetSpec {
                    name: "cp".to_string(),
                    cidr: "10.0.1.0/24".to_string(),
                    role: Some(SubnetRole::ControlPlane),
                },
                SubnetSpec {
                    name: "workers".to_string(),
                    cidr: "10.0.2.0/24".to_string(),
                    role: Some(SubnetRole::Worker),
                },
            ],
            control_plane_endpoint: None,
            authentication: AuthenticationSpec {
                secret_ref: SecretReference {
                    name: "bmm-credentials".to_string(),
                    namespace: None,
                },
            },
        },
        status: None,
    }
}

/// Helper to create a ready NvidiaBMMCluster with cached IDs for `subnets`
pub fn create_test_ready_cluster(name: &str, namespace: &str, subnets: &[&str]) -> NvidiaBMMCluster {
    let mut cluster = create_test_cluster(name, namespace);
    let mut status = NvidiaBMMClusterStatus {
        ready: true,
        vpc_id: Some(Uuid::new_v4().to_string()),
        ..Default::default()
    };
    status.network_status.ip_block_id = Some(Uuid::new_v4().to_string());
    for subnet in subnets {
        status
            .network_status
            .subnet_ids
            .insert(subnet.to_string(), Uuid::new_v4().to_string());
    }
    cluster.status = Some(status);
    cluster
}

/// Helper to create a test NvidiaBMMMachine allocated by instance type
pub fn create_test_machine(name: &str, namespace: &str, subnet: &str) -> NvidiaBMMMachine {
    NvidiaBMMMachine {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: NvidiaBMMMachineSpec {
            provider_id: None,
            instance_type: InstanceTypeSpec {
                id: Some(Uuid::new_v4().to_string()),
                machine_id: None,
                allow_unhealthy_machine: false,
            },
            network: MachineNetworkSpec {
                subnet_name: subnet.to_string(),
                additional_interfaces: vec![],
            },
            ssh_key_groups: vec![],
            labels: BTreeMap::new(),
        },
        status: None,
    }
}

/// Helper to create the Cluster API Machine owning an NvidiaBMMMachine of the same name
pub fn create_test_capi_machine(
    name: &str,
    namespace: &str,
    cluster_name: &str,
    bootstrap_secret: Option<&str>,
    control_plane: bool,
) -> capi::Machine {
    let mut labels = BTreeMap::from([(capi::CLUSTER_NAME_LABEL.to_string(), cluster_name.to_string())]);
    if control_plane {
        labels.insert(capi::MACHINE_CONTROL_PLANE_LABEL.to_string(), String::new());
    }

    capi::Machine {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: capi::MachineSpec {
            cluster_name: cluster_name.to_string(),
            bootstrap: capi::Bootstrap {
                data_secret_name: bootstrap_secret.map(|s| s.to_string()),
            },
            infrastructure_ref: ContractVersionedObjectReference {
                api_group: INFRASTRUCTURE_GROUP.to_string(),
                kind: "NvidiaBMMMachine".to_string(),
                name: name.to_string(),
            },
            provider_id: None,
        },
        status: None,
    }
}

/// Timestamp for marking an object as being deleted
pub fn deletion_timestamp() -> Time {
    serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z")).unwrap()
}

/// In-memory secrets keyed by namespace and name
#[derive(Debug, Default, Clone)]
pub struct MockSecretReader {
    secrets: HashMap<(String, String), SecretData>,
}

impl MockSecretReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, namespace: &str, name: &str, data: &[(&str, &str)]) -> Self {
        let data = data
            .iter()
            .map(|(key, value)| (key.to_string(), value.as_bytes().to_vec()))
            .collect();
        self.secrets.insert((namespace.to_string(), name.to_string()), data);
        self
    }
}

#[async_trait]
impl SecretReader for MockSecretReader {
    async fn read_secret(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, ControllerError> {
        Ok(self.secrets.get(&(namespace.to_string(), name.to_string())).cloned())
    }
}
