//! Cluster scope
//!
//! Holds an NvidiaBMMCluster for the duration of one pass together with the
//! BMM client built from its credentials secret.

use crate::error::ControllerError;
use crate::reconcile_helpers::{add_finalizer, has_finalizer, remove_finalizer};
use crate::scope::{parse_uuid, resolve_site_id};
use crate::secrets::SecretReader;
use bmm_client::{BmmClient, BmmClientTrait};
use crds::{CLUSTER_FINALIZER, Condition, NvidiaBMMCluster, NvidiaBMMClusterStatus, set_condition};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Secret key holding the API endpoint
pub const ENDPOINT_KEY: &str = "endpoint";
/// Secret key holding the organization name
pub const ORG_NAME_KEY: &str = "orgName";
/// Secret key holding the bearer token
pub const TOKEN_KEY: &str = "token";

/// BMM credentials read from the cluster's secret
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub endpoint: String,
    pub org_name: String,
    pub token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("org_name", &self.org_name)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Build an authenticated client for these credentials
    pub fn connect(&self) -> Result<Arc<dyn BmmClientTrait>, ControllerError> {
        let client = BmmClient::new(self.endpoint.clone(), self.token.clone())
            .map_err(|e| ControllerError::Credentials(format!("cannot build BMM client: {}", e)))?;
        Ok(Arc::new(client))
    }
}

/// Read the credentials secret referenced by the cluster.
///
/// The secret namespace defaults to the cluster's namespace.
pub async fn resolve_credentials(
    cluster: &NvidiaBMMCluster,
    secrets: &dyn SecretReader,
) -> Result<Credentials, ControllerError> {
    let secret_ref = &cluster.spec.authentication.secret_ref;
    let cluster_namespace = cluster.namespace().unwrap_or_default();
    let namespace = secret_ref.namespace_or(&cluster_namespace);

    let data = secrets
        .read_secret(namespace, &secret_ref.name)
        .await?
        .ok_or_else(|| {
            ControllerError::Credentials(format!("credentials secret {}/{} not found", namespace, secret_ref.name))
        })?;

    let field = |key: &str| -> Result<String, ControllerError> {
        let raw = data.get(key).ok_or_else(|| {
            ControllerError::Credentials(format!("secret {}/{} is missing '{}' field", namespace, secret_ref.name, key))
        })?;
        let value = String::from_utf8(raw.clone()).map_err(|_| {
            ControllerError::Credentials(format!("secret {}/{} field '{}' is not UTF-8", namespace, secret_ref.name, key))
        })?;
        Ok(value.trim().to_string())
    };

    Ok(Credentials {
        endpoint: field(ENDPOINT_KEY)?,
        org_name: field(ORG_NAME_KEY)?,
        token: field(TOKEN_KEY)?,
    })
}

/// Scope of one NvidiaBMMCluster reconcile pass
pub struct ClusterScope<'a> {
    cluster: &'a mut NvidiaBMMCluster,
    client: Arc<dyn BmmClientTrait>,
    org_name: String,
}

impl std::fmt::Debug for ClusterScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterScope")
            .field("cluster", &self.cluster.name_any())
            .field("org_name", &self.org_name)
            .finish_non_exhaustive()
    }
}

impl<'a> ClusterScope<'a> {
    /// Resolve credentials from the referenced secret and connect
    pub async fn new(cluster: &'a mut NvidiaBMMCluster, secrets: &dyn SecretReader) -> Result<Self, ControllerError> {
        let credentials = resolve_credentials(cluster, secrets).await?;
        let client = credentials.connect()?;
        Ok(Self::with_client(cluster, client, credentials.org_name))
    }

    /// Use a pre-built client, skipping secret resolution
    pub fn with_client(cluster: &'a mut NvidiaBMMCluster, client: Arc<dyn BmmClientTrait>, org_name: impl Into<String>) -> Self {
        cluster.status.get_or_insert_with(NvidiaBMMClusterStatus::default);
        Self {
            cluster,
            client,
            org_name: org_name.into(),
        }
    }

    pub fn client(&self) -> &dyn BmmClientTrait {
        self.client.as_ref()
    }

    pub fn org_name(&self) -> &str {
        &self.org_name
    }

    pub fn name(&self) -> String {
        self.cluster.name_any()
    }

    pub fn namespace(&self) -> String {
        self.cluster.namespace().unwrap_or_default()
    }

    pub fn cluster(&self) -> &NvidiaBMMCluster {
        self.cluster
    }

    pub fn is_deleting(&self) -> bool {
        self.cluster.metadata.deletion_timestamp.is_some()
    }

    /// Site UUID from the site reference
    pub fn site_id(&self) -> Result<Uuid, ControllerError> {
        resolve_site_id(&self.cluster.spec.site_ref)
    }

    /// Tenant UUID from the spec
    pub fn tenant_id(&self) -> Result<Uuid, ControllerError> {
        parse_uuid(&self.cluster.spec.tenant_id, "tenant ID")
    }

    fn status(&self) -> Option<&NvidiaBMMClusterStatus> {
        self.cluster.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut NvidiaBMMClusterStatus {
        self.cluster.status.get_or_insert_with(NvidiaBMMClusterStatus::default)
    }

    // VPC

    pub fn vpc_id(&self) -> Option<&str> {
        self.status()?.vpc_id.as_deref()
    }

    pub fn set_vpc_id(&mut self, id: Uuid) {
        self.status_mut().vpc_id = Some(id.to_string());
    }

    pub fn clear_vpc_id(&mut self) {
        self.status_mut().vpc_id = None;
    }

    // Subnets

    /// Cached subnet name to ID mapping
    pub fn subnet_ids(&self) -> BTreeMap<String, String> {
        self.status()
            .map(|s| s.network_status.subnet_ids.clone())
            .unwrap_or_default()
    }

    pub fn subnet_id(&self, name: &str) -> Option<&str> {
        self.status()?.network_status.subnet_ids.get(name).map(String::as_str)
    }

    pub fn set_subnet_id(&mut self, name: &str, id: Uuid) {
        self.status_mut()
            .network_status
            .subnet_ids
            .insert(name.to_string(), id.to_string());
    }

    pub fn remove_subnet_id(&mut self, name: &str) {
        self.status_mut().network_status.subnet_ids.remove(name);
    }

    // Network security group

    pub fn nsg_id(&self) -> Option<&str> {
        self.status()?.network_status.nsg_id.as_deref()
    }

    pub fn set_nsg_id(&mut self, id: Uuid) {
        self.status_mut().network_status.nsg_id = Some(id.to_string());
    }

    pub fn clear_nsg_id(&mut self) {
        self.status_mut().network_status.nsg_id = None;
    }

    // IP block

    pub fn ip_block_id(&self) -> Option<&str> {
        self.status()?.network_status.ip_block_id.as_deref()
    }

    pub fn set_ip_block_id(&mut self, id: Uuid) {
        self.status_mut().network_status.ip_block_id = Some(id.to_string());
    }

    pub fn clear_ip_block_id(&mut self) {
        self.status_mut().network_status.ip_block_id = None;
    }

    // Readiness

    pub fn is_ready(&self) -> bool {
        self.status().is_some_and(|s| s.ready)
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.status_mut().ready = ready;
    }

    pub fn set_condition(&mut self, condition: Condition) {
        set_condition(&mut self.status_mut().conditions, condition);
    }

    // Finalizer

    pub fn has_finalizer(&self) -> bool {
        has_finalizer(&self.cluster.metadata, CLUSTER_FINALIZER)
    }

    pub fn add_finalizer(&mut self) -> bool {
        add_finalizer(&mut self.cluster.metadata, CLUSTER_FINALIZER)
    }

    pub fn remove_finalizer(&mut self) -> bool {
        remove_finalizer(&mut self.cluster.metadata, CLUSTER_FINALIZER)
    }
}
