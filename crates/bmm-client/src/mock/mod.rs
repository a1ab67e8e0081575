//! Mock BmmClient for unit testing
//!
//! In-memory implementation of [`BmmClientTrait`] for reconciler tests that
//! must run without a BMM endpoint.
//!
//! Besides storing resources, the mock records every call in order and can be
//! told to fail specific operations, which is what ordering and
//! failure-handling tests assert against.
//!
//! - `network.rs` - VPCs, IP blocks, subnets and network security groups
//! - `compute.rs` - instances

mod compute;
mod network;

use crate::bmm_trait::BmmClientTrait;
use crate::error::BmmError;
use crate::models::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Operation recorded by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Get,
    Delete,
}

/// Resource kind recorded by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Vpc,
    IpBlock,
    Subnet,
    NetworkSecurityGroup,
    Instance,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub operation: Operation,
    pub kind: ResourceKind,
    /// Target id for get/delete, created id for a successful create
    pub id: Option<Uuid>,
}

type FailureKey = (Operation, ResourceKind, Option<Uuid>);

/// Mock BmmClient for testing
#[derive(Clone)]
pub struct MockBmmClient {
    pub(crate) base_url: String,
    // In-memory storage for resources
    pub(crate) vpcs: Arc<Mutex<HashMap<Uuid, Vpc>>>,
    pub(crate) ipblocks: Arc<Mutex<HashMap<Uuid, IpBlock>>>,
    pub(crate) subnets: Arc<Mutex<HashMap<Uuid, Subnet>>>,
    pub(crate) nsgs: Arc<Mutex<HashMap<Uuid, NetworkSecurityGroup>>>,
    pub(crate) instances: Arc<Mutex<HashMap<Uuid, Instance>>>,
    // Request bodies the mock cannot reconstruct from stored resources
    pub(crate) instance_requests: Arc<Mutex<Vec<InstanceCreateRequest>>>,
    pub(crate) instance_delete_requests: Arc<Mutex<Vec<InstanceDeleteRequest>>>,
    pub(crate) calls: Arc<Mutex<Vec<MockCall>>>,
    pub(crate) failures: Arc<Mutex<HashSet<FailureKey>>>,
    pub(crate) initial_instance_status: Arc<Mutex<InstanceStatus>>,
}

impl Default for MockBmmClient {
    fn default() -> Self {
        Self::new("http://mock-bmm")
    }
}

impl MockBmmClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            vpcs: Arc::new(Mutex::new(HashMap::new())),
            ipblocks: Arc::new(Mutex::new(HashMap::new())),
            subnets: Arc::new(Mutex::new(HashMap::new())),
            nsgs: Arc::new(Mutex::new(HashMap::new())),
            instances: Arc::new(Mutex::new(HashMap::new())),
            instance_requests: Arc::new(Mutex::new(Vec::new())),
            instance_delete_requests: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashSet::new())),
            initial_instance_status: Arc::new(Mutex::new(InstanceStatus::Provisioning)),
        }
    }

    /// Make every `operation` on `kind` fail with a 500
    pub fn fail(&self, operation: Operation, kind: ResourceKind) {
        self.failures.lock().unwrap().insert((operation, kind, None));
    }

    /// Make `operation` on one specific resource fail with a 500
    pub fn fail_for(&self, operation: Operation, kind: ResourceKind, id: Uuid) {
        self.failures.lock().unwrap().insert((operation, kind, Some(id)));
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// All calls so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Forget recorded calls (stored resources are kept)
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Number of recorded `operation` calls on `kind`
    pub fn count(&self, operation: Operation, kind: ResourceKind) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == operation && c.kind == kind)
            .count()
    }

    /// Position of the first call matching `operation` on `id`
    pub fn position(&self, operation: Operation, id: Uuid) -> Option<usize> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .position(|c| c.operation == operation && c.id == Some(id))
    }

    /// Delete a resource behind the controller's back (for drift tests)
    pub fn remove(&self, kind: ResourceKind, id: Uuid) {
        match kind {
            ResourceKind::Vpc => { self.vpcs.lock().unwrap().remove(&id); }
            ResourceKind::IpBlock => { self.ipblocks.lock().unwrap().remove(&id); }
            ResourceKind::Subnet => { self.subnets.lock().unwrap().remove(&id); }
            ResourceKind::NetworkSecurityGroup => { self.nsgs.lock().unwrap().remove(&id); }
            ResourceKind::Instance => { self.instances.lock().unwrap().remove(&id); }
        }
    }

    /// Whether a resource currently exists in the mock store
    pub fn contains(&self, kind: ResourceKind, id: Uuid) -> bool {
        match kind {
            ResourceKind::Vpc => self.vpcs.lock().unwrap().contains_key(&id),
            ResourceKind::IpBlock => self.ipblocks.lock().unwrap().contains_key(&id),
            ResourceKind::Subnet => self.subnets.lock().unwrap().contains_key(&id),
            ResourceKind::NetworkSecurityGroup => self.nsgs.lock().unwrap().contains_key(&id),
            ResourceKind::Instance => self.instances.lock().unwrap().contains_key(&id),
        }
    }

    /// Number of stored resources of `kind`
    pub fn stored(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Vpc => self.vpcs.lock().unwrap().len(),
            ResourceKind::IpBlock => self.ipblocks.lock().unwrap().len(),
            ResourceKind::Subnet => self.subnets.lock().unwrap().len(),
            ResourceKind::NetworkSecurityGroup => self.nsgs.lock().unwrap().len(),
            ResourceKind::Instance => self.instances.lock().unwrap().len(),
        }
    }

    /// Insert a VPC (for test setup)
    pub fn add_vpc(&self, vpc: Vpc) {
        self.vpcs.lock().unwrap().insert(vpc.id, vpc);
    }

    /// Insert an IP block (for test setup)
    pub fn add_ipblock(&self, block: IpBlock) {
        self.ipblocks.lock().unwrap().insert(block.id, block);
    }

    /// Insert a subnet (for test setup)
    pub fn add_subnet(&self, subnet: Subnet) {
        self.subnets.lock().unwrap().insert(subnet.id, subnet);
    }

    /// Insert a network security group (for test setup)
    pub fn add_network_security_group(&self, nsg: NetworkSecurityGroup) {
        self.nsgs.lock().unwrap().insert(nsg.id, nsg);
    }

    /// Insert an instance (for test setup)
    pub fn add_instance(&self, instance: Instance) {
        self.instances.lock().unwrap().insert(instance.id, instance);
    }

    /// Stored VPC by id
    pub fn vpc(&self, id: Uuid) -> Option<Vpc> {
        self.vpcs.lock().unwrap().get(&id).cloned()
    }

    /// Stored IP block by id
    pub fn ipblock(&self, id: Uuid) -> Option<IpBlock> {
        self.ipblocks.lock().unwrap().get(&id).cloned()
    }

    /// Stored subnet by id
    pub fn subnet(&self, id: Uuid) -> Option<Subnet> {
        self.subnets.lock().unwrap().get(&id).cloned()
    }

    /// Stored network security group by id
    pub fn network_security_group(&self, id: Uuid) -> Option<NetworkSecurityGroup> {
        self.nsgs.lock().unwrap().get(&id).cloned()
    }

    /// Stored instance by id
    pub fn instance(&self, id: Uuid) -> Option<Instance> {
        self.instances.lock().unwrap().get(&id).cloned()
    }

    /// Status given to newly created instances (default Provisioning)
    pub fn set_initial_instance_status(&self, status: InstanceStatus) {
        *self.initial_instance_status.lock().unwrap() = status;
    }

    /// Change the status of a stored instance
    pub fn set_instance_status(&self, id: Uuid, status: InstanceStatus) {
        if let Some(instance) = self.instances.lock().unwrap().get_mut(&id) {
            instance.status = Some(status);
        }
    }

    /// Replace the IP addresses of a stored instance's first interface
    pub fn set_instance_addresses(&self, id: Uuid, addresses: &[&str]) {
        if let Some(instance) = self.instances.lock().unwrap().get_mut(&id) {
            if instance.interfaces.is_empty() {
                instance.interfaces.push(InstanceInterface::default());
            }
            instance.interfaces[0].ip_addresses = addresses.iter().map(|a| a.to_string()).collect();
        }
    }

    /// Every instance create request received, in order
    pub fn instance_requests(&self) -> Vec<InstanceCreateRequest> {
        self.instance_requests.lock().unwrap().clone()
    }

    /// Every instance delete request body received, in order
    pub fn instance_delete_requests(&self) -> Vec<InstanceDeleteRequest> {
        self.instance_delete_requests.lock().unwrap().clone()
    }

    /// Record a call and return the injected failure, if any
    pub(crate) fn record(&self, operation: Operation, kind: ResourceKind, id: Option<Uuid>) -> Result<(), BmmError> {
        self.calls.lock().unwrap().push(MockCall { operation, kind, id });

        let failures = self.failures.lock().unwrap();
        let hit = failures.contains(&(operation, kind, None))
            || id.is_some_and(|id| failures.contains(&(operation, kind, Some(id))));
        if hit {
            return Err(BmmError::Api {
                status: 500,
                message: format!("injected failure: {:?} {:?} {:?}", operation, kind, id),
            });
        }
        Ok(())
    }

    /// Patch the id of the most recent create call once it is known
    pub(crate) fn record_created(&self, id: Uuid) {
        if let Some(last) = self.calls.lock().unwrap().last_mut() {
            last.id = Some(id);
        }
    }
}

#[async_trait::async_trait]
impl BmmClientTrait for MockBmmClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn create_vpc(&self, org: &str, request: &VpcCreateRequest) -> Result<Vpc, BmmError> {
        network::create_vpc(self, org, request).await
    }

    async fn get_vpc(&self, org: &str, id: Uuid) -> Result<Vpc, BmmError> {
        network::get_vpc(self, org, id).await
    }

    async fn delete_vpc(&self, org: &str, id: Uuid) -> Result<(), BmmError> {
        network::delete_vpc(self, org, id).await
    }

    async fn create_ipblock(&self, org: &str, request: &IpBlockCreateRequest) -> Result<IpBlock, BmmError> {
        network::create_ipblock(self, org, request).await
    }

    async fn get_ipblock(&self, org: &str, id: Uuid) -> Result<IpBlock, BmmError> {
        network::get_ipblock(self, org, id).await
    }

    async fn delete_ipblock(&self, org: &str, id: Uuid) -> Result<(), BmmError> {
        network::delete_ipblock(self, org, id).await
    }

    async fn create_subnet(&self, org: &str, request: &SubnetCreateRequest) -> Result<Subnet, BmmError> {
        network::create_subnet(self, org, request).await
    }

    async fn get_subnet(&self, org: &str, id: Uuid) -> Result<Subnet, BmmError> {
        network::get_subnet(self, org, id).await
    }

    async fn delete_subnet(&self, org: &str, id: Uuid) -> Result<(), BmmError> {
        network::delete_subnet(self, org, id).await
    }

    async fn create_network_security_group(
        &self,
        org: &str,
        request: &NetworkSecurityGroupCreateRequest,
    ) -> Result<NetworkSecurityGroup, BmmError> {
        network::create_network_security_group(self, org, request).await
    }

    async fn get_network_security_group(&self, org: &str, id: Uuid) -> Result<NetworkSecurityGroup, BmmError> {
        network::get_network_security_group(self, org, id).await
    }

    async fn delete_network_security_group(&self, org: &str, id: Uuid) -> Result<(), BmmError> {
        network::delete_network_security_group(self, org, id).await
    }

    async fn create_instance(&self, org: &str, request: &InstanceCreateRequest) -> Result<Instance, BmmError> {
        compute::create_instance(self, org, request).await
    }

    async fn get_instance(&self, org: &str, id: Uuid) -> Result<Instance, BmmError> {
        compute::get_instance(self, org, id).await
    }

    async fn delete_instance(
        &self,
        org: &str,
        id: Uuid,
        request: &InstanceDeleteRequest,
    ) -> Result<(), BmmError> {
        compute::delete_instance(self, org, id, request).await
    }
}
