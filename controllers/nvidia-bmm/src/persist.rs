//! Writing the outcome of a reconcile pass back to the API server.
//!
//! A pass produces a list of [`PersistStep`]s that [`apply`] sends in order
//! through an [`ObjectWriter`]. The provider object's status always goes
//! first so remote identifiers are recorded before anything else can fail,
//! and the finalizer list always goes last, carrying the resource version
//! returned by the previous write to the same object.

use crate::error::ControllerError;
use crate::reconcile_helpers::{
    cluster_status_patch, control_plane_endpoint_patch, finalizers_patch, machine_addresses_patch,
    machine_status_patch, provider_id_patch,
};
use async_trait::async_trait;
use crds::capi;
use crds::{ApiEndpoint, NvidiaBMMCluster, NvidiaBMMMachine};
use kube::api::{Patch, PatchParams};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use tracing::debug;

/// Object a patch is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchTarget {
    /// The provider object being reconciled
    Object,
    /// Status subresource of the provider object
    ObjectStatus,
    /// The owning Cluster API Machine
    OwnerMachine,
    /// Status subresource of the owning Cluster API Machine
    OwnerMachineStatus,
    /// The NvidiaBMMCluster a machine belongs to
    InfraCluster,
}

impl PatchTarget {
    fn is_object(self) -> bool {
        matches!(self, Self::Object | Self::ObjectStatus)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PersistStep {
    Patch { target: PatchTarget, patch: Value },
    /// Replace the provider object's finalizer list
    Finalizers(Vec<String>),
}

/// Result of one merge patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Written {
    Applied { resource_version: Option<String> },
    /// The target no longer exists
    Gone,
}

#[async_trait]
pub trait ObjectWriter: Send + Sync {
    async fn merge_patch(&self, target: PatchTarget, patch: &Value) -> Result<Written, ControllerError>;
}

/// Send `steps` in order, stopping at the first failure.
///
/// Returns early without error once the provider object is gone.
pub async fn apply(
    writer: &dyn ObjectWriter,
    steps: Vec<PersistStep>,
    resource_version: Option<String>,
) -> Result<(), ControllerError> {
    let mut resource_version = resource_version;
    for step in steps {
        let (target, patch) = match step {
            PersistStep::Patch { target, patch } => (target, patch),
            PersistStep::Finalizers(finalizers) => (
                PatchTarget::Object,
                finalizers_patch(&finalizers, resource_version.as_deref()),
            ),
        };

        match writer.merge_patch(target, &patch).await? {
            Written::Applied {
                resource_version: latest,
            } if target.is_object() => {
                if latest.is_some() {
                    resource_version = latest;
                }
            }
            Written::Applied { .. } => {}
            Written::Gone if target.is_object() => {
                debug!("Object already gone, skipping remaining patches");
                return Ok(());
            }
            Written::Gone => debug!("{:?} already gone, skipping patch", target),
        }
    }
    Ok(())
}

fn finalizers_changed(before: &Option<Vec<String>>, after: &Option<Vec<String>>) -> Option<Vec<String>> {
    (before != after).then(|| after.clone().unwrap_or_default())
}

/// Writes for one NvidiaBMMCluster pass
pub fn cluster_steps(before: &NvidiaBMMCluster, after: &NvidiaBMMCluster) -> Vec<PersistStep> {
    let mut steps = Vec::new();

    if before.status != after.status {
        if let Some(status) = &after.status {
            steps.push(PersistStep::Patch {
                target: PatchTarget::ObjectStatus,
                patch: cluster_status_patch(before.status.as_ref(), status),
            });
        }
    }

    if let Some(finalizers) = finalizers_changed(&before.metadata.finalizers, &after.metadata.finalizers) {
        steps.push(PersistStep::Finalizers(finalizers));
    }
    steps
}

/// Writes for one NvidiaBMMMachine pass.
///
/// `owner` holds the owning Machine before and after the pass; it is `None`
/// when the Machine is already gone.
pub fn machine_steps(
    before: &NvidiaBMMMachine,
    after: &NvidiaBMMMachine,
    owner: Option<(&capi::Machine, &capi::Machine)>,
    adopted_endpoint: Option<&ApiEndpoint>,
) -> Vec<PersistStep> {
    let mut steps = Vec::new();

    if before.status != after.status {
        if let Some(status) = &after.status {
            steps.push(PersistStep::Patch {
                target: PatchTarget::ObjectStatus,
                patch: machine_status_patch(status),
            });
        }
    }

    if before.spec.provider_id != after.spec.provider_id {
        steps.push(PersistStep::Patch {
            target: PatchTarget::Object,
            patch: provider_id_patch(after.spec.provider_id.as_deref()),
        });
    }

    if let Some((owner_before, owner_after)) = owner {
        if owner_before.spec.provider_id != owner_after.spec.provider_id {
            steps.push(PersistStep::Patch {
                target: PatchTarget::OwnerMachine,
                patch: provider_id_patch(owner_after.spec.provider_id.as_deref()),
            });
        }

        let before_addresses = owner_before.status.as_ref().map(|s| s.addresses.as_slice()).unwrap_or_default();
        let after_addresses = owner_after.status.as_ref().map(|s| s.addresses.as_slice()).unwrap_or_default();
        if before_addresses != after_addresses {
            steps.push(PersistStep::Patch {
                target: PatchTarget::OwnerMachineStatus,
                patch: machine_addresses_patch(after_addresses),
            });
        }
    }

    if let Some(endpoint) = adopted_endpoint {
        steps.push(PersistStep::Patch {
            target: PatchTarget::InfraCluster,
            patch: control_plane_endpoint_patch(endpoint),
        });
    }

    if let Some(finalizers) = finalizers_changed(&before.metadata.finalizers, &after.metadata.finalizers) {
        steps.push(PersistStep::Finalizers(finalizers));
    }
    steps
}

fn written<K: Resource>(result: Result<K, kube::Error>) -> Result<Written, ControllerError> {
    match result {
        Ok(obj) => Ok(Written::Applied {
            resource_version: obj.resource_version(),
        }),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(Written::Gone),
        Err(e) => Err(ControllerError::Kube(e)),
    }
}

/// [`ObjectWriter`] backed by the Kubernetes API
pub struct KubeWriter<K> {
    api: Api<K>,
    name: String,
    owner: Option<(Api<capi::Machine>, String)>,
    cluster: Option<(Api<NvidiaBMMCluster>, String)>,
}

impl<K> KubeWriter<K> {
    pub fn new(api: Api<K>, name: impl Into<String>) -> Self {
        Self {
            api,
            name: name.into(),
            owner: None,
            cluster: None,
        }
    }

    pub fn with_owner(mut self, api: Api<capi::Machine>, name: impl Into<String>) -> Self {
        self.owner = Some((api, name.into()));
        self
    }

    pub fn with_cluster(mut self, api: Api<NvidiaBMMCluster>, name: impl Into<String>) -> Self {
        self.cluster = Some((api, name.into()));
        self
    }
}

#[async_trait]
impl<K> ObjectWriter for KubeWriter<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    async fn merge_patch(&self, target: PatchTarget, patch: &Value) -> Result<Written, ControllerError> {
        let params = PatchParams::default();
        let patch = Patch::Merge(patch);
        match target {
            PatchTarget::Object => written(self.api.patch(&self.name, &params, &patch).await),
            PatchTarget::ObjectStatus => written(self.api.patch_status(&self.name, &params, &patch).await),
            PatchTarget::OwnerMachine | PatchTarget::OwnerMachineStatus => {
                let Some((api, name)) = &self.owner else {
                    return Ok(Written::Gone);
                };
                if target == PatchTarget::OwnerMachine {
                    written(api.patch(name, &params, &patch).await)
                } else {
                    written(api.patch_status(name, &params, &patch).await)
                }
            }
            PatchTarget::InfraCluster => {
                let Some((api, name)) = &self.cluster else {
                    return Ok(Written::Gone);
                };
                written(api.patch(name, &params, &patch).await)
            }
        }
    }
}
