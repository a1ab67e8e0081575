//! Machine scope
//!
//! Holds an NvidiaBMMMachine, its owning Cluster API `Machine` and the
//! NvidiaBMMCluster it belongs to. The cluster is read-only here: machines
//! consume the cluster's cached network state but never write it.
//!
//! Provider ID and addresses are mirrored onto both machine records so
//! consumers watching either one see the same state.

use crate::error::ControllerError;
use crate::providerid::ProviderId;
use crate::reconcile_helpers::{add_finalizer, has_finalizer, remove_finalizer};
use crate::scope::{parse_uuid, resolve_site_id};
use crate::secrets::SecretReader;
use bmm_client::BmmClientTrait;
use crds::capi::{self, MachineStatus};
use crds::{
    ApiEndpoint, Condition, InstanceState, MACHINE_FINALIZER, MachineAddress, NvidiaBMMCluster,
    NvidiaBMMMachine, NvidiaBMMMachineStatus, set_condition,
};
use kube::ResourceExt;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Key of the bootstrap payload inside its secret
pub const BOOTSTRAP_DATA_KEY: &str = "value";

/// How an instance is placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceAllocation {
    /// Any machine of the given instance type
    InstanceType(Uuid),
    /// One specific machine
    Machine {
        machine_id: String,
        allow_unhealthy: bool,
    },
}

/// Scope of one NvidiaBMMMachine reconcile pass
pub struct MachineScope<'a> {
    machine: &'a mut NvidiaBMMMachine,
    owner: &'a mut capi::Machine,
    cluster: &'a NvidiaBMMCluster,
    secrets: &'a dyn SecretReader,
    client: Arc<dyn BmmClientTrait>,
    org_name: String,
}

impl std::fmt::Debug for MachineScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineScope")
            .field("machine", &self.machine.name_any())
            .field("owner", &self.owner.name_any())
            .field("cluster", &self.cluster.name_any())
            .field("org_name", &self.org_name)
            .finish_non_exhaustive()
    }
}

impl<'a> MachineScope<'a> {
    pub fn new(
        machine: &'a mut NvidiaBMMMachine,
        owner: &'a mut capi::Machine,
        cluster: &'a NvidiaBMMCluster,
        secrets: &'a dyn SecretReader,
        client: Arc<dyn BmmClientTrait>,
        org_name: impl Into<String>,
    ) -> Self {
        machine.status.get_or_insert_with(NvidiaBMMMachineStatus::default);
        Self {
            machine,
            owner,
            cluster,
            secrets,
            client,
            org_name: org_name.into(),
        }
    }

    pub fn client(&self) -> &dyn BmmClientTrait {
        self.client.as_ref()
    }

    pub fn org_name(&self) -> &str {
        &self.org_name
    }

    pub fn name(&self) -> String {
        self.machine.name_any()
    }

    pub fn namespace(&self) -> String {
        self.machine.namespace().unwrap_or_default()
    }

    pub fn machine(&self) -> &NvidiaBMMMachine {
        self.machine
    }

    pub fn is_deleting(&self) -> bool {
        self.machine.metadata.deletion_timestamp.is_some()
    }

    // Bootstrap

    /// Whether the bootstrap provider has produced a data secret
    pub fn has_bootstrap_data_reference(&self) -> bool {
        self.owner.bootstrap_data_secret_name().is_some()
    }

    /// Bootstrap payload, forwarded unmodified as instance user-data
    pub async fn bootstrap_data(&self) -> Result<String, ControllerError> {
        let name = self
            .owner
            .bootstrap_data_secret_name()
            .ok_or_else(|| ControllerError::BootstrapData("bootstrap data secret name is not set".to_string()))?;
        let namespace = self.owner.namespace().unwrap_or_else(|| self.namespace());

        let data = self
            .secrets
            .read_secret(&namespace, name)
            .await?
            .ok_or_else(|| ControllerError::BootstrapData(format!("bootstrap secret {}/{} not found", namespace, name)))?;
        let value = data.get(BOOTSTRAP_DATA_KEY).ok_or_else(|| {
            ControllerError::BootstrapData(format!(
                "bootstrap secret {}/{} missing '{}' key",
                namespace, name, BOOTSTRAP_DATA_KEY
            ))
        })?;

        String::from_utf8(value.clone())
            .map_err(|_| ControllerError::BootstrapData(format!("bootstrap secret {}/{} is not UTF-8", namespace, name)))
    }

    // Cluster lookups

    pub fn cluster_ready(&self) -> bool {
        self.cluster.is_ready()
    }

    pub fn cluster_name(&self) -> String {
        self.cluster.name_any()
    }

    pub fn cluster_has_control_plane_endpoint(&self) -> bool {
        self.cluster.has_control_plane_endpoint()
    }

    /// Subnet ID for a subnet name, from the cluster's cached network state
    pub fn subnet_id(&self, name: &str) -> Result<Uuid, ControllerError> {
        let id = self
            .cluster
            .status
            .as_ref()
            .and_then(|s| s.network_status.subnet_ids.get(name))
            .ok_or_else(|| ControllerError::InvalidConfig(format!("subnet {} not found in cluster status", name)))?;
        parse_uuid(id, "subnet ID")
    }

    /// Subnet ID of the primary interface
    pub fn primary_subnet_id(&self) -> Result<Uuid, ControllerError> {
        self.subnet_id(&self.machine.spec.network.subnet_name)
    }

    pub fn vpc_id(&self) -> Result<Uuid, ControllerError> {
        let id = self
            .cluster
            .status
            .as_ref()
            .and_then(|s| s.vpc_id.as_deref())
            .ok_or_else(|| ControllerError::NotFound(format!("cluster {} has no VPC ID", self.cluster.name_any())))?;
        parse_uuid(id, "VPC ID")
    }

    pub fn tenant_id(&self) -> Result<Uuid, ControllerError> {
        parse_uuid(&self.cluster.spec.tenant_id, "tenant ID")
    }

    pub fn site_id(&self) -> Result<Uuid, ControllerError> {
        resolve_site_id(&self.cluster.spec.site_ref)
    }

    // Role and allocation

    pub fn is_control_plane(&self) -> bool {
        self.owner.is_control_plane()
    }

    pub fn role(&self) -> &'static str {
        if self.is_control_plane() { "control-plane" } else { "worker" }
    }

    /// Allocation strategy; exactly one of type ID or machine ID must be set
    pub fn instance_allocation(&self) -> Result<InstanceAllocation, ControllerError> {
        let spec = &self.machine.spec.instance_type;
        let type_id = spec.id.as_deref().filter(|v| !v.is_empty());
        let machine_id = spec.machine_id.as_deref().filter(|v| !v.is_empty());

        match (type_id, machine_id) {
            (Some(type_id), None) => Ok(InstanceAllocation::InstanceType(parse_uuid(type_id, "instance type ID")?)),
            (None, Some(machine_id)) => Ok(InstanceAllocation::Machine {
                machine_id: machine_id.to_string(),
                allow_unhealthy: spec.allow_unhealthy_machine,
            }),
            (Some(_), Some(_)) => Err(ControllerError::InvalidConfig(
                "instanceType.id and instanceType.machineID are mutually exclusive".to_string(),
            )),
            (None, None) => Err(ControllerError::InvalidConfig(
                "one of instanceType.id or instanceType.machineID is required".to_string(),
            )),
        }
    }

    pub fn ssh_key_group_ids(&self) -> Result<Vec<Uuid>, ControllerError> {
        self.machine
            .spec
            .ssh_key_groups
            .iter()
            .map(|id| parse_uuid(id, "SSH key group ID"))
            .collect()
    }

    // Provider ID

    /// Decoded provider ID, if set and well-formed
    pub fn provider_id(&self) -> Option<ProviderId> {
        let raw = self.machine.spec.provider_id.as_deref().filter(|v| !v.is_empty())?;
        match ProviderId::decode(raw) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("NvidiaBMMMachine {} has an unreadable provider ID {:?}: {}", self.name(), raw, e);
                None
            }
        }
    }

    /// Compose the provider ID and write it to both machine records
    pub fn set_provider_id(&mut self, tenant: &str, site: &str, instance_id: Uuid) -> Result<(), ControllerError> {
        let encoded = ProviderId::new(self.org_name.clone(), tenant, site, instance_id)?.encode();
        self.machine.spec.provider_id = Some(encoded.clone());
        self.owner.spec.provider_id = Some(encoded);
        Ok(())
    }

    // Instance mirrors

    fn status(&self) -> Option<&NvidiaBMMMachineStatus> {
        self.machine.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut NvidiaBMMMachineStatus {
        self.machine.status.get_or_insert_with(NvidiaBMMMachineStatus::default)
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.status()?.instance_id.as_deref().filter(|v| !v.is_empty())
    }

    pub fn set_instance_id(&mut self, id: Uuid) {
        self.status_mut().instance_id = Some(id.to_string());
    }

    pub fn clear_instance_id(&mut self) {
        self.status_mut().instance_id = None;
    }

    pub fn machine_id(&self) -> Option<&str> {
        self.status()?.machine_id.as_deref()
    }

    pub fn set_machine_id(&mut self, machine_id: Option<String>) {
        if machine_id.is_some() {
            self.status_mut().machine_id = machine_id;
        }
    }

    pub fn instance_state(&self) -> Option<InstanceState> {
        self.status()?.instance_state
    }

    pub fn set_instance_state(&mut self, state: InstanceState) {
        self.status_mut().instance_state = Some(state);
    }

    pub fn is_ready(&self) -> bool {
        self.status().is_some_and(|s| s.ready)
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.status_mut().ready = ready;
    }

    pub fn addresses(&self) -> &[MachineAddress] {
        self.status().map(|s| s.addresses.as_slice()).unwrap_or_default()
    }

    /// Record addresses on both machine records
    pub fn set_addresses(&mut self, addresses: Vec<MachineAddress>) {
        self.owner
            .status
            .get_or_insert_with(MachineStatus::default)
            .addresses
            .clone_from(&addresses);
        self.status_mut().addresses = addresses;
    }

    /// Control-plane endpoint this machine would offer the cluster
    pub fn endpoint_candidate(&self, port: i32) -> Option<ApiEndpoint> {
        self.addresses().first().map(|address| ApiEndpoint {
            host: address.address.clone(),
            port,
        })
    }

    pub fn set_condition(&mut self, condition: Condition) {
        set_condition(&mut self.status_mut().conditions, condition);
    }

    // Finalizer

    pub fn has_finalizer(&self) -> bool {
        has_finalizer(&self.machine.metadata, MACHINE_FINALIZER)
    }

    pub fn add_finalizer(&mut self) -> bool {
        add_finalizer(&mut self.machine.metadata, MACHINE_FINALIZER)
    }

    pub fn remove_finalizer(&mut self) -> bool {
        remove_finalizer(&mut self.machine.metadata, MACHINE_FINALIZER)
    }
}
