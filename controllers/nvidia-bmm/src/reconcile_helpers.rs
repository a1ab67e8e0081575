//! Helper functions for common reconciliation patterns
//!
//! Finalizer bookkeeping, the stale-cache check shared by every cached BMM
//! identifier, and the merge-patch builders used to persist a pass.

use crate::error::ControllerError;
use bmm_client::BmmError;
use crds::{ApiEndpoint, MachineAddress, NvidiaBMMClusterStatus, NvidiaBMMMachineStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{Map, Value, json};
use std::future::Future;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Whether the object carries the finalizer
pub fn has_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == finalizer))
}

/// Add the finalizer; returns false when it was already present
pub fn add_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    if has_finalizer(meta, finalizer) {
        return false;
    }
    meta.finalizers.get_or_insert_with(Vec::new).push(finalizer.to_string());
    true
}

/// Remove the finalizer; returns false when it was not present
pub fn remove_finalizer(meta: &mut ObjectMeta, finalizer: &str) -> bool {
    let Some(finalizers) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    before != finalizers.len()
}

/// Verify a cached BMM resource still exists.
///
/// Returns:
/// - `Ok(Some(resource))` if it exists
/// - `Ok(None)` if BMM reports it gone (stale cache, recreate)
/// - `Err` for any other failure; the cache is left alone
pub async fn check_existing<F, R>(lookup: F, resource_name: &str, id: Uuid) -> Result<Option<R>, ControllerError>
where
    F: Future<Output = Result<R, BmmError>> + Send,
{
    match lookup.await {
        Ok(existing) => {
            debug!("{} (ID: {}) exists in BMM", resource_name, id);
            Ok(Some(existing))
        }
        Err(e) if e.is_not_found() => {
            warn!("{} (ID: {}) no longer exists in BMM (drift detected), will recreate", resource_name, id);
            Ok(None)
        }
        Err(e) => {
            error!("Failed to verify {} (ID: {}) exists: {}, will retry", resource_name, id, e);
            Err(ControllerError::Bmm(e))
        }
    }
}

/// Issue a delete, treating "already absent" as success
pub async fn delete_tolerating_absent<F>(delete: F, resource_name: &str, id: Uuid) -> Result<(), ControllerError>
where
    F: Future<Output = Result<(), BmmError>> + Send,
{
    match delete.await {
        Ok(()) => {
            info!("Deleted {} (ID: {}) from BMM", resource_name, id);
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            info!("{} (ID: {}) already absent from BMM", resource_name, id);
            Ok(())
        }
        Err(e) => {
            error!("Failed to delete {} (ID: {}): {}", resource_name, id, e);
            Err(ControllerError::Bmm(e))
        }
    }
}

/// Parse a cached identifier; an empty or malformed value counts as absent
pub fn parse_cached_id(value: Option<&str>, resource_name: &str) -> Option<Uuid> {
    let raw = value.filter(|v| !v.is_empty())?;
    match Uuid::parse_str(raw) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("Cached {} ID {:?} is not a valid UUID ({}), treating as absent", resource_name, raw, e);
            None
        }
    }
}

/// Parse a cached identifier that is about to be deleted.
///
/// An empty value counts as absent. A malformed value is an error: the remote
/// resource it named can no longer be addressed, so the finalizer must stay.
pub fn parse_cached_id_for_delete(raw: &str, resource_name: &str) -> Result<Option<Uuid>, ControllerError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    Uuid::parse_str(raw).map(Some).map_err(|e| {
        ControllerError::InvalidConfig(format!("invalid cached {} ID {:?}: {}", resource_name, raw, e))
    })
}

/// Status merge patch for an NvidiaBMMCluster.
///
/// Cleared IDs are written as `null`, and subnet names present in `before`
/// but gone from `after` are removed with explicit `null` entries, so the
/// stored status matches `after` exactly.
pub fn cluster_status_patch(before: Option<&NvidiaBMMClusterStatus>, after: &NvidiaBMMClusterStatus) -> Value {
    let mut subnet_ids = Map::new();
    if let Some(before) = before {
        for name in before.network_status.subnet_ids.keys() {
            if !after.network_status.subnet_ids.contains_key(name) {
                subnet_ids.insert(name.clone(), Value::Null);
            }
        }
    }
    for (name, id) in &after.network_status.subnet_ids {
        subnet_ids.insert(name.clone(), Value::String(id.clone()));
    }

    json!({
        "status": {
            "ready": after.ready,
            "vpcID": after.vpc_id,
            "networkStatus": {
                "subnetIDs": subnet_ids,
                "nsgID": after.network_status.nsg_id,
                "ipBlockID": after.network_status.ip_block_id,
            },
            "conditions": after.conditions,
        }
    })
}

/// Status merge patch for an NvidiaBMMMachine; cleared fields are written as `null`
pub fn machine_status_patch(after: &NvidiaBMMMachineStatus) -> Value {
    json!({
        "status": {
            "ready": after.ready,
            "instanceID": after.instance_id,
            "machineID": after.machine_id,
            "instanceState": after.instance_state,
            "addresses": after.addresses,
            "conditions": after.conditions,
        }
    })
}

/// Metadata merge patch replacing the finalizer list.
///
/// Pass the resource version of the latest write in this pass (the status
/// patch bumps it) so only a concurrent writer causes a conflict.
pub fn finalizers_patch(finalizers: &[String], resource_version: Option<&str>) -> Value {
    match resource_version {
        Some(rv) => json!({ "metadata": { "finalizers": finalizers, "resourceVersion": rv } }),
        None => json!({ "metadata": { "finalizers": finalizers } }),
    }
}

/// Spec merge patch for `spec.providerID`
pub fn provider_id_patch(provider_id: Option<&str>) -> Value {
    json!({ "spec": { "providerID": provider_id } })
}

/// Status merge patch for a Cluster API Machine's addresses
pub fn machine_addresses_patch(addresses: &[MachineAddress]) -> Value {
    json!({ "status": { "addresses": addresses } })
}

/// Spec merge patch recording a cluster's control-plane endpoint
pub fn control_plane_endpoint_patch(endpoint: &ApiEndpoint) -> Value {
    json!({ "spec": { "controlPlaneEndpoint": { "host": endpoint.host, "port": endpoint.port } } })
}

#[cfg(test)]
#[path = "reconcile_helpers_test.rs"]
mod tests;
