//! BMM API client
//!
//! Implements the Carbide REST API client. Every resource lives under
//! `/v2/org/{org}/carbide/{kind}` and is addressed by UUID.

use crate::bmm_trait::BmmClientTrait;
use crate::error::BmmError;
use crate::models::*;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// BMM API client
pub struct BmmClient {
    client: Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for BmmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BmmClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BmmClient {
    /// Create a new BMM client
    ///
    /// # Arguments
    /// * `base_url` - BMM API endpoint (e.g., "https://bmm.example.com")
    /// * `token` - Bearer token for authentication
    pub fn new(base_url: String, token: String) -> Result<Self, BmmError> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(BmmError::InvalidRequest(format!(
                "endpoint must be an http(s) URL, got {:?}",
                base_url
            )));
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn collection_url(&self, org: &str, kind: &str) -> String {
        format!("{}/v2/org/{}/carbide/{}", self.base_url, urlencoding::encode(org), kind)
    }

    fn item_url(&self, org: &str, kind: &str, id: Uuid) -> String {
        format!("{}/{}", self.collection_url(org, kind), id)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, BmmError> {
        let response = self.authorized(request).send().await.map_err(|e| {
            if e.is_timeout() {
                BmmError::Timeout(format!("{}: {}", what, e))
            } else {
                BmmError::Http(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(BmmError::NotFound(what.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BmmError::Authentication(format!(
                "{}: {} - {}",
                what, status, body
            ))),
            _ => Err(BmmError::Api {
                status: status.as_u16(),
                message: format!("Failed to {}: {}", what, body),
            }),
        }
    }

    async fn create<Req, Res>(&self, org: &str, kind: &str, request: &Req) -> Result<Res, BmmError>
    where
        Req: serde::Serialize + Sync,
        Res: DeserializeOwned,
    {
        let url = self.collection_url(org, kind);
        debug!("Creating {} at {}", kind, url);
        let response = self
            .send(self.client.post(&url).json(request), &format!("create {}", kind))
            .await?;
        Ok(response.json().await?)
    }

    async fn get<Res: DeserializeOwned>(&self, org: &str, kind: &str, id: Uuid) -> Result<Res, BmmError> {
        let url = self.item_url(org, kind, id);
        debug!("Fetching {} {}", kind, id);
        let response = self
            .send(self.client.get(&url), &format!("get {} {}", kind, id))
            .await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, org: &str, kind: &str, id: Uuid) -> Result<(), BmmError> {
        let url = self.item_url(org, kind, id);
        debug!("Deleting {} {}", kind, id);
        self.send(self.client.delete(&url), &format!("delete {} {}", kind, id))
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BmmClientTrait for BmmClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn create_vpc(&self, org: &str, request: &VpcCreateRequest) -> Result<Vpc, BmmError> {
        self.create(org, "vpc", request).await
    }

    async fn get_vpc(&self, org: &str, id: Uuid) -> Result<Vpc, BmmError> {
        self.get(org, "vpc", id).await
    }

    async fn delete_vpc(&self, org: &str, id: Uuid) -> Result<(), BmmError> {
        self.delete(org, "vpc", id).await
    }

    async fn create_ipblock(&self, org: &str, request: &IpBlockCreateRequest) -> Result<IpBlock, BmmError> {
        self.create(org, "ipblock", request).await
    }

    async fn get_ipblock(&self, org: &str, id: Uuid) -> Result<IpBlock, BmmError> {
        self.get(org, "ipblock", id).await
    }

    async fn delete_ipblock(&self, org: &str, id: Uuid) -> Result<(), BmmError> {
        self.delete(org, "ipblock", id).await
    }

    async fn create_subnet(&self, org: &str, request: &SubnetCreateRequest) -> Result<Subnet, BmmError> {
        self.create(org, "subnet", request).await
    }

    async fn get_subnet(&self, org: &str, id: Uuid) -> Result<Subnet, BmmError> {
        self.get(org, "subnet", id).await
    }

    async fn delete_subnet(&self, org: &str, id: Uuid) -> Result<(), BmmError> {
        self.delete(org, "subnet", id).await
    }

    async fn create_network_security_group(
        &self,
        org: &str,
        request: &NetworkSecurityGroupCreateRequest,
    ) -> Result<NetworkSecurityGroup, BmmError> {
        self.create(org, "network-security-group", request).await
    }

    async fn get_network_security_group(&self, org: &str, id: Uuid) -> Result<NetworkSecurityGroup, BmmError> {
        self.get(org, "network-security-group", id).await
    }

    async fn delete_network_security_group(&self, org: &str, id: Uuid) -> Result<(), BmmError> {
        self.delete(org, "network-security-group", id).await
    }

    async fn create_instance(&self, org: &str, request: &InstanceCreateRequest) -> Result<Instance, BmmError> {
        self.create(org, "instance", request).await
    }

    async fn get_instance(&self, org: &str, id: Uuid) -> Result<Instance, BmmError> {
        self.get(org, "instance", id).await
    }

    async fn delete_instance(
        &self,
        org: &str,
        id: Uuid,
        request: &InstanceDeleteRequest,
    ) -> Result<(), BmmError> {
        let url = self.item_url(org, "instance", id);
        debug!("Deleting instance {}", id);
        self.send(
            self.client.delete(&url).json(request),
            &format!("delete instance {}", id),
        )
        .await?;
        Ok(())
    }
}
