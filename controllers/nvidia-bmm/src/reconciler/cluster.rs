//! NvidiaBMMCluster reconciliation
//!
//! Converges VPC, IP block, subnets and the optional network security group,
//! in that order, and tears them down in reverse order on deletion. Every
//! step checks the cached identifier first and only creates when the cache is
//! empty or stale.

use super::ReconcileOutcome;
use crate::cidr::{derive_subnet_prefix, ip_block_request};
use crate::error::ControllerError;
use crate::reconcile_helpers::{
    check_existing, delete_tolerating_absent, parse_cached_id, parse_cached_id_for_delete,
};
use crate::scope::ClusterScope;
use bmm_client::{
    NetworkSecurityGroupCreateRequest, NetworkSecurityGroupRule, RuleAction, RuleDirection, RuleProtocol,
    SubnetCreateRequest, VpcCreateRequest,
};
use crds::{
    Condition, NSG_READY_CONDITION, NetworkSecurityGroupRule as RuleSpec, NetworkSecurityGroupSpec,
    NetworkVirtualizationType, READY_CONDITION, SUBNETS_READY_CONDITION, VPC_READY_CONDITION, reasons,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Prefix meaning "any address" in NSG rules
pub const ANY_PREFIX: &str = "0.0.0.0/0";

/// Run one reconcile pass over the cluster in `scope`
#[instrument(skip(scope), fields(cluster = %scope.name(), namespace = %scope.namespace()))]
pub async fn reconcile(scope: &mut ClusterScope<'_>) -> Result<ReconcileOutcome, ControllerError> {
    if scope.is_deleting() {
        return reconcile_delete(scope).await;
    }
    reconcile_normal(scope).await
}

async fn reconcile_normal(scope: &mut ClusterScope<'_>) -> Result<ReconcileOutcome, ControllerError> {
    info!("Reconciling NvidiaBMMCluster {}/{}", scope.namespace(), scope.name());

    if scope.add_finalizer() {
        info!("Added finalizer to NvidiaBMMCluster {}", scope.name());
        return Ok(ReconcileOutcome::RequeueNow);
    }

    match converge(scope).await {
        Ok(()) => {
            if !scope.is_ready() {
                info!("NvidiaBMMCluster {} network is ready", scope.name());
            }
            scope.set_ready(true);
            scope.set_condition(Condition::true_(READY_CONDITION, reasons::PROVISIONED));
            Ok(ReconcileOutcome::Done)
        }
        Err(e) => {
            let reason = if e.is_configuration() {
                reasons::INVALID_CONFIGURATION
            } else {
                reasons::RECONCILE_FAILED
            };
            scope.set_ready(false);
            scope.set_condition(Condition::false_(READY_CONDITION, reason, e.to_string()));
            Err(e)
        }
    }
}

/// Pick the condition reason for a failed step
fn failure_reason(e: &ControllerError, step_reason: &'static str) -> &'static str {
    if e.is_configuration() {
        reasons::INVALID_CONFIGURATION
    } else {
        step_reason
    }
}

async fn converge(scope: &mut ClusterScope<'_>) -> Result<(), ControllerError> {
    let site_id = match scope.site_id() {
        Ok(id) => id,
        Err(e) => {
            scope.set_condition(Condition::false_(VPC_READY_CONDITION, reasons::SITE_NOT_FOUND, e.to_string()));
            return Err(e);
        }
    };

    let vpc_id = match reconcile_vpc(scope, site_id).await {
        Ok(id) => id,
        Err(e) => {
            let reason = failure_reason(&e, reasons::VPC_CREATION_FAILED);
            scope.set_condition(Condition::false_(VPC_READY_CONDITION, reason, e.to_string()));
            return Err(e);
        }
    };
    scope.set_condition(Condition::true_(VPC_READY_CONDITION, reasons::PROVISIONED));

    let ip_block_id = match ensure_ip_block(scope, site_id).await {
        Ok(id) => id,
        Err(e) => {
            let reason = failure_reason(&e, reasons::IP_BLOCK_CREATION_FAILED);
            scope.set_condition(Condition::false_(SUBNETS_READY_CONDITION, reason, e.to_string()));
            return Err(e);
        }
    };

    if let Err(e) = reconcile_subnets(scope, vpc_id, ip_block_id).await {
        let reason = failure_reason(&e, reasons::SUBNET_CREATION_FAILED);
        scope.set_condition(Condition::false_(SUBNETS_READY_CONDITION, reason, e.to_string()));
        return Err(e);
    }
    scope.set_condition(Condition::true_(SUBNETS_READY_CONDITION, reasons::PROVISIONED));

    if let Some(nsg_spec) = scope.cluster().spec.vpc.network_security_group.clone() {
        if let Err(e) = reconcile_nsg(scope, site_id, &nsg_spec).await {
            let reason = failure_reason(&e, reasons::NSG_CREATION_FAILED);
            scope.set_condition(Condition::false_(NSG_READY_CONDITION, reason, e.to_string()));
            return Err(e);
        }
        scope.set_condition(Condition::true_(NSG_READY_CONDITION, reasons::PROVISIONED));
    }

    Ok(())
}

fn virtualization_type(value: NetworkVirtualizationType) -> bmm_client::NetworkVirtualizationType {
    match value {
        NetworkVirtualizationType::EthernetVirtualizer => bmm_client::NetworkVirtualizationType::EthernetVirtualizer,
        NetworkVirtualizationType::Fnn => bmm_client::NetworkVirtualizationType::Fnn,
    }
}

async fn reconcile_vpc(scope: &mut ClusterScope<'_>, site_id: Uuid) -> Result<Uuid, ControllerError> {
    if let Some(vpc_id) = parse_cached_id(scope.vpc_id(), "VPC") {
        let existing = check_existing(scope.client().get_vpc(scope.org_name(), vpc_id), "VPC", vpc_id).await?;
        if existing.is_some() {
            debug!("VPC {} already exists", vpc_id);
            return Ok(vpc_id);
        }
    }
    scope.clear_vpc_id();

    let spec = &scope.cluster().spec.vpc;
    let name = if spec.name.is_empty() { scope.name() } else { spec.name.clone() };
    let request = VpcCreateRequest {
        name,
        site_id,
        network_virtualization_type: spec.network_virtualization_type.map(virtualization_type),
        labels: (!spec.labels.is_empty()).then(|| spec.labels.clone()),
    };

    info!("Creating VPC {} in site {}", request.name, site_id);
    let vpc = scope.client().create_vpc(scope.org_name(), &request).await?;
    scope.set_vpc_id(vpc.id);
    info!("Created VPC {} (ID: {})", vpc.name, vpc.id);
    Ok(vpc.id)
}

async fn ensure_ip_block(scope: &mut ClusterScope<'_>, site_id: Uuid) -> Result<Uuid, ControllerError> {
    if let Some(block_id) = parse_cached_id(scope.ip_block_id(), "IP block") {
        let existing = check_existing(scope.client().get_ipblock(scope.org_name(), block_id), "IP block", block_id).await?;
        if existing.is_some() {
            debug!("IP block {} already exists", block_id);
            return Ok(block_id);
        }
    }
    scope.clear_ip_block_id();

    let request = ip_block_request(&scope.name(), site_id);
    info!(
        "Creating IP block {} ({}/{}) in site {}",
        request.name, request.prefix, request.prefix_length, site_id
    );
    let block = scope.client().create_ipblock(scope.org_name(), &request).await?;
    scope.set_ip_block_id(block.id);
    info!("Created IP block {} (ID: {})", block.name, block.id);
    Ok(block.id)
}

async fn reconcile_subnets(scope: &mut ClusterScope<'_>, vpc_id: Uuid, ip_block_id: Uuid) -> Result<(), ControllerError> {
    let subnets = scope.cluster().spec.subnets.clone();

    for subnet in &subnets {
        if let Some(subnet_id) = parse_cached_id(scope.subnet_id(&subnet.name), "subnet") {
            let existing = check_existing(scope.client().get_subnet(scope.org_name(), subnet_id), "Subnet", subnet_id).await?;
            if existing.is_some() {
                debug!("Subnet {} already exists (ID: {})", subnet.name, subnet_id);
                continue;
            }
        }
        scope.remove_subnet_id(&subnet.name);

        let prefix = derive_subnet_prefix(&subnet.cidr)?;
        if prefix.network.to_string() != subnet.cidr.split('/').next().unwrap_or_default().trim() {
            warn!(
                "Subnet {} CIDR {} has host bits set, using {}/{}",
                subnet.name, subnet.cidr, prefix.network, prefix.prefix_length
            );
        }

        let request = SubnetCreateRequest {
            name: subnet.name.clone(),
            vpc_id,
            ipv4_block_id: Some(ip_block_id),
            prefix_length: prefix.prefix_length,
        };
        info!(
            "Creating subnet {} (/{}) in VPC {} from IP block {}",
            subnet.name, prefix.prefix_length, vpc_id, ip_block_id
        );
        let created = scope.client().create_subnet(scope.org_name(), &request).await?;
        scope.set_subnet_id(&subnet.name, created.id);
        info!("Created subnet {} (ID: {})", subnet.name, created.id);
    }

    Ok(())
}

async fn reconcile_nsg(
    scope: &mut ClusterScope<'_>,
    site_id: Uuid,
    nsg_spec: &NetworkSecurityGroupSpec,
) -> Result<(), ControllerError> {
    if let Some(nsg_id) = parse_cached_id(scope.nsg_id(), "NSG") {
        let existing = check_existing(
            scope.client().get_network_security_group(scope.org_name(), nsg_id),
            "NSG",
            nsg_id,
        )
        .await?;
        if existing.is_some() {
            debug!("NSG {} already exists", nsg_id);
            return Ok(());
        }
    }
    scope.clear_nsg_id();

    let rules = nsg_spec
        .rules
        .iter()
        .map(translate_rule)
        .collect::<Result<Vec<_>, _>>()?;
    let request = NetworkSecurityGroupCreateRequest {
        name: nsg_spec.name.clone(),
        site_id,
        rules: (!rules.is_empty()).then_some(rules),
    };

    info!("Creating NSG {} in site {}", request.name, site_id);
    let nsg = scope
        .client()
        .create_network_security_group(scope.org_name(), &request)
        .await?;
    scope.set_nsg_id(nsg.id);
    info!("Created NSG {} (ID: {})", nsg.name, nsg.id);
    Ok(())
}

/// Translate a declared rule into the form BMM accepts.
///
/// Direction, protocol and action are matched case-insensitively; unset
/// prefixes mean any address and the port range applies to the destination.
pub fn translate_rule(rule: &RuleSpec) -> Result<NetworkSecurityGroupRule, ControllerError> {
    let invalid = |field: &str, value: &str| {
        ControllerError::InvalidConfig(format!("NSG rule {:?}: unknown {} {:?}", rule.name, field, value))
    };

    let direction = match rule.direction.trim().to_lowercase().as_str() {
        "ingress" => RuleDirection::Ingress,
        "egress" => RuleDirection::Egress,
        _ => return Err(invalid("direction", &rule.direction)),
    };
    let protocol = match rule.protocol.trim().to_lowercase().as_str() {
        "tcp" => RuleProtocol::Tcp,
        "udp" => RuleProtocol::Udp,
        "icmp" => RuleProtocol::Icmp,
        "all" => RuleProtocol::All,
        _ => return Err(invalid("protocol", &rule.protocol)),
    };
    let action = match rule.action.trim().to_lowercase().as_str() {
        "allow" => RuleAction::Allow,
        "deny" => RuleAction::Deny,
        _ => return Err(invalid("action", &rule.action)),
    };

    let prefix_or_any = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(ANY_PREFIX)
            .to_string()
    };

    Ok(NetworkSecurityGroupRule {
        name: Some(rule.name.clone()).filter(|n| !n.is_empty()),
        direction,
        protocol,
        action,
        source_prefix: prefix_or_any(&rule.source_cidr),
        destination_prefix: prefix_or_any(&rule.destination_cidr),
        source_port_range: None,
        destination_port_range: rule.port_range.clone().filter(|p| !p.trim().is_empty()),
    })
}

async fn reconcile_delete(scope: &mut ClusterScope<'_>) -> Result<ReconcileOutcome, ControllerError> {
    info!("Deleting NvidiaBMMCluster {}/{}", scope.namespace(), scope.name());

    if !scope.has_finalizer() {
        debug!("NvidiaBMMCluster {} has no finalizer, nothing to clean up", scope.name());
        return Ok(ReconcileOutcome::Done);
    }

    scope.set_ready(false);
    if let Err(e) = delete_network_resources(scope).await {
        scope.set_condition(Condition::false_(READY_CONDITION, reasons::DELETION_FAILED, e.to_string()));
        return Err(e);
    }

    scope.remove_finalizer();
    info!("Successfully deleted NvidiaBMMCluster {}", scope.name());
    Ok(ReconcileOutcome::Done)
}

/// Delete NSG, subnets, IP block and VPC, stopping at the first failure.
///
/// Each cached ID is cleared as soon as its delete is confirmed, so a retry
/// resumes where the failed pass stopped. A malformed cached ID stops the
/// pass and leaves the finalizer in place.
async fn delete_network_resources(scope: &mut ClusterScope<'_>) -> Result<(), ControllerError> {
    if let Some(raw) = scope.nsg_id().map(str::to_string) {
        if let Some(nsg_id) = parse_cached_id_for_delete(&raw, "NSG")? {
            info!("Deleting NSG {}", nsg_id);
            delete_tolerating_absent(
                scope.client().delete_network_security_group(scope.org_name(), nsg_id),
                "NSG",
                nsg_id,
            )
            .await?;
        }
        scope.clear_nsg_id();
    }

    for (name, raw) in scope.subnet_ids() {
        if let Some(subnet_id) = parse_cached_id_for_delete(&raw, "subnet")? {
            info!("Deleting subnet {} ({})", name, subnet_id);
            delete_tolerating_absent(scope.client().delete_subnet(scope.org_name(), subnet_id), "Subnet", subnet_id)
                .await?;
        }
        scope.remove_subnet_id(&name);
    }

    if let Some(raw) = scope.ip_block_id().map(str::to_string) {
        if let Some(block_id) = parse_cached_id_for_delete(&raw, "IP block")? {
            info!("Deleting IP block {}", block_id);
            delete_tolerating_absent(scope.client().delete_ipblock(scope.org_name(), block_id), "IP block", block_id)
                .await?;
        }
        scope.clear_ip_block_id();
    }

    if let Some(raw) = scope.vpc_id().map(str::to_string) {
        if let Some(vpc_id) = parse_cached_id_for_delete(&raw, "VPC")? {
            info!("Deleting VPC {}", vpc_id);
            delete_tolerating_absent(scope.client().delete_vpc(scope.org_name(), vpc_id), "VPC", vpc_id).await?;
        }
        scope.clear_vpc_id();
    }

    Ok(())
}

#[cfg(test)]
#[path = "cluster_test.rs"]
mod tests;
