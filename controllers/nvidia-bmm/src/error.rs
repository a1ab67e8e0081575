//! Controller-specific error types.
//!
//! Configuration errors (bad CIDRs, malformed identifiers, conflicting spec
//! fields, unusable credentials) are kept apart from remote and Kubernetes
//! failures so reconcilers can pick the condition reason to surface.

use crate::providerid::ProviderIdError;
use bmm_client::BmmError;
use kube::Error as KubeError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the NVIDIA BMM controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// BMM API error
    #[error("BMM error: {0}")]
    Bmm(#[from] BmmError),

    /// Spec value the controller cannot act on
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Credentials secret missing or incomplete
    #[error("Invalid credentials: {0}")]
    Credentials(String),

    /// Provider ID could not be composed or parsed
    #[error("Provider ID error: {0}")]
    ProviderId(#[from] ProviderIdError),

    /// Bootstrap data secret missing or unusable
    #[error("Bootstrap data error: {0}")]
    BootstrapData(String),

    /// Reconcile pass exceeded its deadline
    #[error("Reconcile timed out after {0:?}")]
    Timeout(Duration),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// A referenced object or cached remote resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

impl ControllerError {
    /// True for errors whose fix is a change to the declared objects rather than a retry.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::Credentials(_) | Self::ProviderId(_) | Self::BootstrapData(_)
        )
    }

    /// Short label used for the error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Kube(_) => "kube",
            Self::Bmm(_) => "bmm",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Credentials(_) => "credentials",
            Self::ProviderId(_) => "provider_id",
            Self::BootstrapData(_) => "bootstrap_data",
            Self::Timeout(_) => "timeout",
            Self::Watch(_) => "watch",
            Self::Metrics(_) => "metrics",
            Self::NotFound(_) => "not_found",
        }
    }
}
