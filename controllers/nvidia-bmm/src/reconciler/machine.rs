//! NvidiaBMMMachine reconciliation
//!
//! Gates on cluster readiness and bootstrap data, creates one BMM instance,
//! polls it until Ready and mirrors its addresses onto the machine records.
//! The first Ready control-plane machine hands its address back to the
//! caller as the cluster's control-plane endpoint.

use super::{DEPENDENCY_REQUEUE, POLL_REQUEUE, ReconcileOutcome};
use crate::error::ControllerError;
use crate::reconcile_helpers::{delete_tolerating_absent, parse_cached_id_for_delete};
use crate::scope::{InstanceAllocation, MachineScope, parse_uuid};
use bmm_client::{BmmError, InstanceCreateRequest, InstanceDeleteRequest, InstanceStatus, InterfaceCreateRequest};
use crds::{
    ApiEndpoint, Condition, INSTANCE_PROVISIONED_CONDITION, InstanceState, MachineAddress,
    NETWORK_CONFIGURED_CONDITION, READY_CONDITION, reasons,
};
use tracing::{debug, info, instrument, warn};

/// Port of the Kubernetes API server on control-plane instances
pub const ENDPOINT_PORT: i32 = 6443;

/// Result of one machine pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineOutcome {
    pub outcome: ReconcileOutcome,
    /// Control-plane endpoint the cluster should adopt, if this pass found one
    pub adopted_endpoint: Option<ApiEndpoint>,
}

impl From<ReconcileOutcome> for MachineOutcome {
    fn from(outcome: ReconcileOutcome) -> Self {
        Self {
            outcome,
            adopted_endpoint: None,
        }
    }
}

/// Run one reconcile pass over the machine in `scope`
#[instrument(skip(scope), fields(machine = %scope.name(), namespace = %scope.namespace()))]
pub async fn reconcile(scope: &mut MachineScope<'_>) -> Result<MachineOutcome, ControllerError> {
    if scope.is_deleting() {
        return reconcile_delete(scope).await.map(MachineOutcome::from);
    }
    reconcile_normal(scope).await
}

async fn reconcile_normal(scope: &mut MachineScope<'_>) -> Result<MachineOutcome, ControllerError> {
    info!("Reconciling NvidiaBMMMachine {}/{}", scope.namespace(), scope.name());

    if !scope.cluster_ready() {
        info!(
            "NvidiaBMMCluster {} is not ready yet, waiting before provisioning {}",
            scope.cluster_name(),
            scope.name()
        );
        return Ok(ReconcileOutcome::RequeueAfter(DEPENDENCY_REQUEUE).into());
    }

    if !scope.has_bootstrap_data_reference() {
        info!("Bootstrap data secret not yet available for {}, waiting", scope.name());
        return Ok(ReconcileOutcome::RequeueAfter(DEPENDENCY_REQUEUE).into());
    }

    if scope.add_finalizer() {
        info!("Added finalizer to NvidiaBMMMachine {}", scope.name());
        return Ok(ReconcileOutcome::RequeueNow.into());
    }

    if scope.instance_id().is_some() {
        return reconcile_instance(scope).await;
    }

    match create_instance(scope).await {
        Ok(()) => {
            scope.set_condition(Condition::true_(INSTANCE_PROVISIONED_CONDITION, reasons::PROVISIONED));
            Ok(ReconcileOutcome::RequeueAfter(DEPENDENCY_REQUEUE).into())
        }
        Err(e) => {
            let reason = if e.is_configuration() {
                reasons::INVALID_CONFIGURATION
            } else {
                reasons::INSTANCE_CREATION_FAILED
            };
            scope.set_condition(Condition::false_(INSTANCE_PROVISIONED_CONDITION, reason, e.to_string()));
            scope.set_ready(false);
            scope.set_condition(Condition::false_(READY_CONDITION, reason, e.to_string()));
            Err(e)
        }
    }
}

/// Build and submit the instance create request, then cache what BMM returned
async fn create_instance(scope: &mut MachineScope<'_>) -> Result<(), ControllerError> {
    let user_data = scope.bootstrap_data().await?;

    let mut interfaces = vec![InterfaceCreateRequest {
        subnet_id: scope.primary_subnet_id()?,
        is_physical: false,
    }];
    for additional in &scope.machine().spec.network.additional_interfaces {
        interfaces.push(InterfaceCreateRequest {
            subnet_id: scope.subnet_id(&additional.subnet_name)?,
            is_physical: additional.is_physical,
        });
    }

    let tenant_id = scope.tenant_id()?;
    let site_id = scope.site_id()?;
    let vpc_id = scope.vpc_id()?;
    let ssh_key_group_ids = scope.ssh_key_group_ids()?;
    let labels = scope.machine().spec.labels.clone();

    let mut request = InstanceCreateRequest {
        name: scope.name(),
        tenant_id,
        vpc_id,
        user_data: Some(user_data),
        interfaces,
        ssh_key_group_ids: (!ssh_key_group_ids.is_empty()).then_some(ssh_key_group_ids),
        labels: (!labels.is_empty()).then_some(labels),
        phone_home_enabled: Some(true),
        ..Default::default()
    };
    match scope.instance_allocation()? {
        InstanceAllocation::InstanceType(type_id) => {
            request.instance_type_id = Some(type_id);
        }
        InstanceAllocation::Machine {
            machine_id,
            allow_unhealthy,
        } => {
            request.machine_id = Some(machine_id);
            request.allow_unhealthy_machine = Some(allow_unhealthy);
        }
    }

    info!(
        "Creating {} instance {} in VPC {} ({} interfaces)",
        scope.role(),
        request.name,
        vpc_id,
        request.interfaces.len()
    );
    let instance = scope.client().create_instance(scope.org_name(), &request).await?;

    scope.set_instance_id(instance.id);
    scope.set_machine_id(instance.machine_id.clone());
    scope.set_instance_state(instance_state(instance.status));
    scope.set_provider_id(&tenant_id.to_string(), &site_id.to_string(), instance.id)?;
    info!("Created instance {} (ID: {})", instance.name, instance.id);
    Ok(())
}

/// Poll the cached instance and mirror its state
async fn reconcile_instance(scope: &mut MachineScope<'_>) -> Result<MachineOutcome, ControllerError> {
    let raw = scope.instance_id().unwrap_or_default().to_string();
    let instance_id = match parse_uuid(&raw, "instance ID") {
        Ok(id) => id,
        Err(e) => {
            scope.set_ready(false);
            scope.set_condition(Condition::false_(READY_CONDITION, reasons::INVALID_CONFIGURATION, e.to_string()));
            return Err(e);
        }
    };

    let instance = match scope.client().get_instance(scope.org_name(), instance_id).await {
        Ok(instance) => instance,
        Err(e) => {
            let reason = match e {
                BmmError::NotFound(_) => {
                    warn!("Instance {} for {} no longer exists in BMM", instance_id, scope.name());
                    reasons::INSTANCE_NOT_FOUND
                }
                _ => reasons::INSTANCE_QUERY_FAILED,
            };
            scope.set_ready(false);
            scope.set_condition(Condition::false_(INSTANCE_PROVISIONED_CONDITION, reason, e.to_string()));
            scope.set_condition(Condition::false_(READY_CONDITION, reason, e.to_string()));
            return Err(ControllerError::Bmm(e));
        }
    };

    let state = instance_state(instance.status);
    if scope.instance_state() != Some(state) {
        info!("Instance {} is {}", instance_id, state);
    }
    scope.set_instance_state(state);
    scope.set_machine_id(instance.machine_id.clone());

    if scope.provider_id().is_none() {
        let tenant = scope.tenant_id()?.to_string();
        let site = scope.site_id()?.to_string();
        scope.set_provider_id(&tenant, &site, instance_id)?;
    }

    let addresses: Vec<MachineAddress> = instance
        .interfaces
        .iter()
        .flat_map(|interface| interface.ip_addresses.iter())
        .map(MachineAddress::internal_ip)
        .collect();
    if !addresses.is_empty() {
        debug!("Instance {} has addresses {:?}", instance_id, addresses);
        scope.set_addresses(addresses);
        scope.set_condition(Condition::true_(NETWORK_CONFIGURED_CONDITION, reasons::ADDRESSES_ASSIGNED));
    }

    if state != InstanceState::Ready {
        scope.set_ready(false);
        scope.set_condition(Condition::false_(
            READY_CONDITION,
            reasons::INSTANCE_NOT_READY,
            format!("instance is {}", state),
        ));
        return Ok(ReconcileOutcome::RequeueAfter(POLL_REQUEUE).into());
    }

    if !scope.is_ready() {
        info!("NvidiaBMMMachine {} is ready", scope.name());
    }
    scope.set_ready(true);
    scope.set_condition(Condition::true_(READY_CONDITION, reasons::PROVISIONED));

    let mut adopted_endpoint = None;
    if scope.is_control_plane() && !scope.cluster_has_control_plane_endpoint() {
        adopted_endpoint = scope.endpoint_candidate(ENDPOINT_PORT);
        match &adopted_endpoint {
            Some(endpoint) => info!(
                "Adopting {}:{} as control-plane endpoint of cluster {}",
                endpoint.host,
                endpoint.port,
                scope.cluster_name()
            ),
            None => warn!("Control-plane instance {} is ready but has no address", instance_id),
        }
    }

    Ok(MachineOutcome {
        outcome: ReconcileOutcome::Done,
        adopted_endpoint,
    })
}

async fn reconcile_delete(scope: &mut MachineScope<'_>) -> Result<ReconcileOutcome, ControllerError> {
    info!("Deleting NvidiaBMMMachine {}/{}", scope.namespace(), scope.name());

    if !scope.has_finalizer() {
        debug!("NvidiaBMMMachine {} has no finalizer, nothing to clean up", scope.name());
        return Ok(ReconcileOutcome::Done);
    }

    scope.set_ready(false);
    if let Some(raw) = scope.instance_id().map(str::to_string) {
        if let Err(e) = delete_instance(scope, &raw).await {
            scope.set_condition(Condition::false_(READY_CONDITION, reasons::DELETION_FAILED, e.to_string()));
            return Err(e);
        }
        scope.clear_instance_id();
    }

    scope.remove_finalizer();
    info!("Successfully deleted NvidiaBMMMachine {}", scope.name());
    Ok(ReconcileOutcome::Done)
}

async fn delete_instance(scope: &mut MachineScope<'_>, raw: &str) -> Result<(), ControllerError> {
    let Some(instance_id) = parse_cached_id_for_delete(raw, "instance")? else {
        return Ok(());
    };
    info!("Deleting instance {}", instance_id);
    let request = InstanceDeleteRequest::default();
    delete_tolerating_absent(
        scope.client().delete_instance(scope.org_name(), instance_id, &request),
        "Instance",
        instance_id,
    )
    .await?;
    scope.set_instance_state(InstanceState::Terminating);
    Ok(())
}

/// Map the remote instance status onto the mirrored state
pub fn instance_state(status: Option<InstanceStatus>) -> InstanceState {
    match status {
        Some(InstanceStatus::Pending) => InstanceState::Pending,
        Some(InstanceStatus::Provisioning) => InstanceState::Provisioning,
        Some(InstanceStatus::Ready) => InstanceState::Ready,
        Some(InstanceStatus::Error) => InstanceState::Error,
        Some(InstanceStatus::Terminating) => InstanceState::Terminating,
        Some(InstanceStatus::Unknown) | None => InstanceState::Unknown,
    }
}

#[cfg(test)]
#[path = "machine_test.rs"]
mod tests;
