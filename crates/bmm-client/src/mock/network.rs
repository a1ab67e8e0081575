//! Network operations for MockBmmClient
//!
//! Handles VPCs, IP blocks, subnets and network security groups

use super::{MockBmmClient, Operation, ResourceKind};
use crate::error::BmmError;
use crate::models::*;
use uuid::Uuid;

pub async fn create_vpc(client: &MockBmmClient, _org: &str, request: &VpcCreateRequest) -> Result<Vpc, BmmError> {
    client.record(Operation::Create, ResourceKind::Vpc, None)?;
    let vpc = Vpc {
        id: Uuid::new_v4(),
        name: request.name.clone(),
        site_id: Some(request.site_id),
        network_virtualization_type: request.network_virtualization_type,
        labels: request.labels.clone(),
    };
    client.record_created(vpc.id);
    client.vpcs.lock().unwrap().insert(vpc.id, vpc.clone());
    Ok(vpc)
}

pub async fn get_vpc(client: &MockBmmClient, _org: &str, id: Uuid) -> Result<Vpc, BmmError> {
    client.record(Operation::Get, ResourceKind::Vpc, Some(id))?;
    client.vpcs
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .ok_or_else(|| BmmError::NotFound(format!("VPC {} not found", id)))
}

pub async fn delete_vpc(client: &MockBmmClient, _org: &str, id: Uuid) -> Result<(), BmmError> {
    client.record(Operation::Delete, ResourceKind::Vpc, Some(id))?;
    client.vpcs
        .lock()
        .unwrap()
        .remove(&id)
        .map(|_| ())
        .ok_or_else(|| BmmError::NotFound(format!("VPC {} not found", id)))
}

pub async fn create_ipblock(client: &MockBmmClient, _org: &str, request: &IpBlockCreateRequest) -> Result<IpBlock, BmmError> {
    client.record(Operation::Create, ResourceKind::IpBlock, None)?;
    let block = IpBlock {
        id: Uuid::new_v4(),
        name: request.name.clone(),
        prefix: Some(request.prefix.clone()),
        prefix_length: Some(request.prefix_length),
    };
    client.record_created(block.id);
    client.ipblocks.lock().unwrap().insert(block.id, block.clone());
    Ok(block)
}

pub async fn get_ipblock(client: &MockBmmClient, _org: &str, id: Uuid) -> Result<IpBlock, BmmError> {
    client.record(Operation::Get, ResourceKind::IpBlock, Some(id))?;
    client.ipblocks
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .ok_or_else(|| BmmError::NotFound(format!("IP block {} not found", id)))
}

pub async fn delete_ipblock(client: &MockBmmClient, _org: &str, id: Uuid) -> Result<(), BmmError> {
    client.record(Operation::Delete, ResourceKind::IpBlock, Some(id))?;
    client.ipblocks
        .lock()
        .unwrap()
        .remove(&id)
        .map(|_| ())
        .ok_or_else(|| BmmError::NotFound(format!("IP block {} not found", id)))
}

pub async fn create_subnet(client: &MockBmmClient, _org: &str, request: &SubnetCreateRequest) -> Result<Subnet, BmmError> {
    client.record(Operation::Create, ResourceKind::Subnet, None)?;
    if let Some(block_id) = request.ipv4_block_id {
        if !client.ipblocks.lock().unwrap().contains_key(&block_id) {
            return Err(BmmError::Api {
                status: 400,
                message: format!("IP block {} does not exist", block_id),
            });
        }
    }
    let subnet = Subnet {
        id: Uuid::new_v4(),
        name: request.name.clone(),
        vpc_id: Some(request.vpc_id),
        ipv4_block_id: request.ipv4_block_id,
        ipv4_prefix: None,
        prefix_length: Some(request.prefix_length),
    };
    client.record_created(subnet.id);
    client.subnets.lock().unwrap().insert(subnet.id, subnet.clone());
    Ok(subnet)
}

pub async fn get_subnet(client: &MockBmmClient, _org: &str, id: Uuid) -> Result<Subnet, BmmError> {
    client.record(Operation::Get, ResourceKind::Subnet, Some(id))?;
    client.subnets
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .ok_or_else(|| BmmError::NotFound(format!("Subnet {} not found", id)))
}

pub async fn delete_subnet(client: &MockBmmClient, _org: &str, id: Uuid) -> Result<(), BmmError> {
    client.record(Operation::Delete, ResourceKind::Subnet, Some(id))?;
    client.subnets
        .lock()
        .unwrap()
        .remove(&id)
        .map(|_| ())
        .ok_or_else(|| BmmError::NotFound(format!("Subnet {} not found", id)))
}

pub async fn create_network_security_group(
    client: &MockBmmClient,
    _org: &str,
    request: &NetworkSecurityGroupCreateRequest,
) -> Result<NetworkSecurityGroup, BmmError> {
    client.record(Operation::Create, ResourceKind::NetworkSecurityGroup, None)?;
    let nsg = NetworkSecurityGroup {
        id: Uuid::new_v4(),
        name: request.name.clone(),
        rules: request.rules.clone().unwrap_or_default(),
    };
    client.record_created(nsg.id);
    client.nsgs.lock().unwrap().insert(nsg.id, nsg.clone());
    Ok(nsg)
}

pub async fn get_network_security_group(client: &MockBmmClient, _org: &str, id: Uuid) -> Result<NetworkSecurityGroup, BmmError> {
    client.record(Operation::Get, ResourceKind::NetworkSecurityGroup, Some(id))?;
    client.nsgs
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .ok_or_else(|| BmmError::NotFound(format!("Network security group {} not found", id)))
}

pub async fn delete_network_security_group(client: &MockBmmClient, _org: &str, id: Uuid) -> Result<(), BmmError> {
    client.record(Operation::Delete, ResourceKind::NetworkSecurityGroup, Some(id))?;
    client.nsgs
        .lock()
        .unwrap()
        .remove(&id)
        .map(|_| ())
        .ok_or_else(|| BmmError::NotFound(format!("Network security group {} not found", id)))
}
