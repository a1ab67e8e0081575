//! NVIDIA BMM CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the NVIDIA BMM Cluster API
//! infrastructure provider, plus the slice of the generic Cluster API
//! `Cluster` and `Machine` records the controllers read and patch.

pub mod capi;
pub mod conditions;
pub mod nvidia_bmm_cluster;
pub mod nvidia_bmm_machine;
pub mod nvidia_bmm_machine_template;
pub mod references;

pub use conditions::*;
pub use nvidia_bmm_cluster::*;
pub use nvidia_bmm_machine::*;
pub use nvidia_bmm_machine_template::*;
pub use references::*;

/// API group shared by every infrastructure resource in this crate.
pub const INFRASTRUCTURE_GROUP: &str = "infrastructure.cluster.x-k8s.io";

/// Finalizer placed on `NvidiaBMMCluster` objects while remote resources exist.
pub const CLUSTER_FINALIZER: &str = "nvidiabmmcluster.infrastructure.cluster.x-k8s.io";

/// Finalizer placed on `NvidiaBMMMachine` objects while a remote instance exists.
pub const MACHINE_FINALIZER: &str = "nvidiabmmmachine.infrastructure.cluster.x-k8s.io";
