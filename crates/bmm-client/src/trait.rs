//! Trait abstraction over the BMM client
//!
//! Reconcilers depend on this trait rather than on [`crate::BmmClient`], so a
//! mock can be substituted at construction time in tests.

use crate::error::BmmError;
use crate::models::*;
use uuid::Uuid;

/// Operations the infrastructure provider performs against BMM.
///
/// Every call is scoped to an organization. `get_*` and `delete_*` return
/// [`BmmError::NotFound`] for absent resources.
#[async_trait::async_trait]
pub trait BmmClientTrait: Send + Sync {
    /// Base URL of the API
    fn base_url(&self) -> &str;

    // VPC
    async fn create_vpc(&self, org: &str, request: &VpcCreateRequest) -> Result<Vpc, BmmError>;
    async fn get_vpc(&self, org: &str, id: Uuid) -> Result<Vpc, BmmError>;
    async fn delete_vpc(&self, org: &str, id: Uuid) -> Result<(), BmmError>;

    // IP block
    async fn create_ipblock(&self, org: &str, request: &IpBlockCreateRequest) -> Result<IpBlock, BmmError>;
    async fn get_ipblock(&self, org: &str, id: Uuid) -> Result<IpBlock, BmmError>;
    async fn delete_ipblock(&self, org: &str, id: Uuid) -> Result<(), BmmError>;

    // Subnet
    async fn create_subnet(&self, org: &str, request: &SubnetCreateRequest) -> Result<Subnet, BmmError>;
    async fn get_subnet(&self, org: &str, id: Uuid) -> Result<Subnet, BmmError>;
    async fn delete_subnet(&self, org: &str, id: Uuid) -> Result<(), BmmError>;

    // Network security group
    async fn create_network_security_group(
        &self,
        org: &str,
        request: &NetworkSecurityGroupCreateRequest,
    ) -> Result<NetworkSecurityGroup, BmmError>;
    async fn get_network_security_group(&self, org: &str, id: Uuid) -> Result<NetworkSecurityGroup, BmmError>;
    async fn delete_network_security_group(&self, org: &str, id: Uuid) -> Result<(), BmmError>;

    // Instance
    async fn create_instance(&self, org: &str, request: &InstanceCreateRequest) -> Result<Instance, BmmError>;
    async fn get_instance(&self, org: &str, id: Uuid) -> Result<Instance, BmmError>;
    async fn delete_instance(
        &self,
        org: &str,
        id: Uuid,
        request: &InstanceDeleteRequest,
    ) -> Result<(), BmmError>;
}
