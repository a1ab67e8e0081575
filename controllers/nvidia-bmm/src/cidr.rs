//! Subnet prefix derivation and the per-cluster IP block.
//!
//! BMM carves subnets out of an IP block by prefix length alone, so the only
//! thing taken from a declared subnet CIDR is its mask. Host bits are masked
//! off and never forwarded.

use crate::error::ControllerError;
use bmm_client::{IpBlockCreateRequest, IpBlockProtocolVersion, IpBlockRoutingType};
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use uuid::Uuid;

/// Network address of every cluster IP block
pub const IP_BLOCK_PREFIX: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 0);

/// Prefix length of every cluster IP block
pub const IP_BLOCK_PREFIX_LENGTH: u8 = 16;

/// Normalized subnet network and mask length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetPrefix {
    /// Network address with host bits cleared
    pub network: Ipv4Addr,
    /// Mask length sent to BMM
    pub prefix_length: u8,
}

/// Derive the prefix length (and normalized network) from an IPv4 CIDR.
///
/// The mask is required: a bare address is rejected rather than read as /32.
pub fn derive_subnet_prefix(cidr: &str) -> Result<SubnetPrefix, ControllerError> {
    let trimmed = cidr.trim();
    if !trimmed.contains('/') {
        return Err(ControllerError::InvalidConfig(format!(
            "subnet CIDR {:?} has no prefix length",
            cidr
        )));
    }

    let network: Ipv4Network = trimmed
        .parse()
        .map_err(|e| ControllerError::InvalidConfig(format!("invalid subnet CIDR {:?}: {}", cidr, e)))?;

    Ok(SubnetPrefix {
        network: network.network(),
        prefix_length: network.prefix(),
    })
}

/// Name of the IP block owned by a cluster
pub fn ip_block_name(cluster_name: &str) -> String {
    format!("{}-ipblock", cluster_name)
}

/// Create request for a cluster's IP block (fixed 10.0.0.0/16, datacenter-only)
pub fn ip_block_request(cluster_name: &str, site_id: Uuid) -> IpBlockCreateRequest {
    IpBlockCreateRequest {
        name: ip_block_name(cluster_name),
        site_id,
        prefix: IP_BLOCK_PREFIX.to_string(),
        prefix_length: IP_BLOCK_PREFIX_LENGTH,
        protocol_version: IpBlockProtocolVersion::Ipv4,
        routing_type: IpBlockRoutingType::DatacenterOnly,
    }
}
