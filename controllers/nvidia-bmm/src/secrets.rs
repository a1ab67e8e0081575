//! Secret access for credentials and bootstrap data.

use crate::error::ControllerError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::collections::BTreeMap;

/// Decoded secret data, key to raw bytes
pub type SecretData = BTreeMap<String, Vec<u8>>;

/// Reads secret data by namespace and name.
///
/// `Ok(None)` means the secret does not exist.
#[async_trait]
pub trait SecretReader: Send + Sync {
    async fn read_secret(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, ControllerError>;
}

/// [`SecretReader`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeSecretReader {
    client: Client,
}

impl std::fmt::Debug for KubeSecretReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretReader").finish_non_exhaustive()
    }
}

impl KubeSecretReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretReader for KubeSecretReader {
    async fn read_secret(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, ControllerError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = api.get_opt(name).await? else {
            return Ok(None);
        };

        let data = secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| (key, value.0))
            .collect();
        Ok(Some(data))
    }
}
