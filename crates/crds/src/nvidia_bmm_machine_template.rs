//! NvidiaBMMMachineTemplate Custom Resource Definition
//!
//! Template consumed by MachineDeployments and control-plane providers to
//! stamp out NvidiaBMMMachines. No controller acts on it directly.

use crate::nvidia_bmm_machine::NvidiaBMMMachineSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// NvidiaBMMMachineTemplateSpec wraps the machine spec to stamp out
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "NvidiaBMMMachineTemplate",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NvidiaBMMMachineTemplateSpec {
    /// Template for new machines
    pub template: NvidiaBMMMachineTemplateResource,
}

/// Body of a machine template
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NvidiaBMMMachineTemplateResource {
    /// Spec copied into each new NvidiaBMMMachine
    pub spec: NvidiaBMMMachineSpec,
}
