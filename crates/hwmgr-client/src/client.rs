//! Hardware manager API client
//!
//! Implements the vendor REST API: tenant-scoped resource pools, resources
//! and resource groups under `/v1/tenants/{tenant}/`.

use crate::common::{segment, HttpClient};
use crate::error::HwMgrError;
use crate::hwmgr_trait::HwMgrClientTrait;
use crate::models::*;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Hardware manager API client
#[derive(Debug, Clone)]
pub struct HwMgrClient {
    http: HttpClient,
    tenant: String,
}

impl HwMgrClient {
    /// Create a new hardware manager client
    ///
    /// # Arguments
    /// * `base_url` - API base URL (e.g., "https://hwmgr.example.com")
    /// * `token` - API token for authentication
    /// * `tenant` - Tenant the requests are scoped to
    pub fn new(base_url: String, token: String, tenant: String) -> Result<Self, HwMgrError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http: HttpClient::new(client, base_url, token),
            tenant,
        })
    }

    fn tenant_path(&self, suffix: &str) -> String {
        format!("/v1/tenants/{}/{}", segment(&self.tenant), suffix)
    }
}

#[async_trait::async_trait]
impl HwMgrClientTrait for HwMgrClient {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Validate the API token by listing resource pools, the lightest
    /// authenticated call the API offers.
    async fn validate_token(&self) -> Result<(), HwMgrError> {
        debug!("Validating hardware manager token and connectivity");
        let _: Vec<ResourcePool> = self.http.get(&self.tenant_path("resourcepools")).await?;
        debug!("Token validated successfully");
        Ok(())
    }

    async fn get_resource_pools(&self) -> Result<Vec<ResourcePool>, HwMgrError> {
        self.http.get(&self.tenant_path("resourcepools")).await
    }

    async fn get_resources(&self) -> Result<Vec<Resource>, HwMgrError> {
        self.http.get(&self.tenant_path("resources")).await
    }

    async fn create_resource_group(&self, request: &ResourceGroupRequest) -> Result<ResourceGroup, HwMgrError> {
        if request.resource_selectors.is_empty() {
            return Err(HwMgrError::InvalidRequest(format!(
                "resource group {} has no resource selectors",
                request.name
            )));
        }

        let body = serde_json::to_value(request)?;
        let group: ResourceGroup = self.http.post(&self.tenant_path("resourcegroups"), &body).await?;
        info!("Created resource group {} (id {})", request.name, group.id);
        Ok(group)
    }

    async fn get_resource_group(&self, id: &str) -> Result<ResourceGroup, HwMgrError> {
        self.http
            .get(&self.tenant_path(&format!("resourcegroups/{}", segment(id))))
            .await
    }

    async fn delete_resource_group(&self, id: &str) -> Result<(), HwMgrError> {
        self.http
            .delete(&self.tenant_path(&format!("resourcegroups/{}", segment(id))))
            .await?;
        info!("Deleted resource group {}", id);
        Ok(())
    }
}
