//! Generic inventory schema.
//!
//! Adaptors translate backend-native resource descriptions into these records
//! for the inventory query service. Fields a backend cannot supply carry an
//! `UNKNOWN` enum value or an empty string, never null where a string is
//! expected. Failures are reported with the HTTP status the query service
//! surfaces: 503 when the backend is unreachable, 500 otherwise.

use crate::adaptors::{AdaptorRegistry, BoxedAdaptor};
use crate::store::ObjectStore;
use crds::HardwareManager;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePoolInfo {
    pub resource_pool_id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub resource_id: String,
    pub resource_pool_id: String,
    pub name: String,
    pub description: String,
    pub admin_state: AdminState,
    pub operational_state: OperationalState,
    pub usage_state: UsageState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_state: Option<PowerState>,
    pub global_asset_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub hw_profile: String,
    /// Memory in MiB
    pub memory: i64,
    pub model: String,
    pub vendor: String,
    pub part_number: String,
    pub serial_number: String,
    #[serde(default)]
    pub processors: Vec<ProcessorInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorInfo {
    pub architecture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<i32>,
    pub manufacturer: String,
    pub model: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminState {
    #[default]
    Unknown,
    Locked,
    ShuttingDown,
    Unlocked,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationalState {
    #[default]
    Unknown,
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageState {
    #[default]
    Unknown,
    Active,
    Busy,
    Idle,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerState {
    On,
    Off,
}

/// Inventory query failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Backend unreachable
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Any other failure while building the inventory
    #[error("internal error: {0}")]
    Internal(String),
}

impl InventoryError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            InventoryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            InventoryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Status code for an inventory result: 200, 500 or 503.
pub fn response_status<T>(result: &Result<T, InventoryError>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status_code(),
    }
}

/// Inventory query outcome as surfaced to the query service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryResponse<T> {
    pub status: StatusCode,
    pub items: Vec<T>,
    pub error: Option<String>,
}

impl<T> From<Result<Vec<T>, InventoryError>> for InventoryResponse<T> {
    fn from(result: Result<Vec<T>, InventoryError>) -> Self {
        let status = response_status(&result);
        match result {
            Ok(items) => Self { status, items, error: None },
            Err(e) => Self {
                status,
                items: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

/// Resolves a HardwareManager and dispatches inventory reads to its adaptor.
pub struct InventoryService {
    hardware_managers: Arc<dyn ObjectStore<HardwareManager>>,
    registry: AdaptorRegistry,
    namespace: String,
}

impl std::fmt::Debug for InventoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryService")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl InventoryService {
    pub fn new(
        hardware_managers: Arc<dyn ObjectStore<HardwareManager>>,
        registry: AdaptorRegistry,
        namespace: String,
    ) -> Self {
        Self {
            hardware_managers,
            registry,
            namespace,
        }
    }

    async fn resolve(&self, hwmgr_id: &str) -> Result<(HardwareManager, BoxedAdaptor), InventoryError> {
        let hwmgr = self
            .hardware_managers
            .get(&self.namespace, hwmgr_id)
            .await
            .map_err(|e| {
                warn!("Unable to resolve hardware manager {}: {}", hwmgr_id, e);
                InventoryError::Internal(format!("unable to get hardware manager {}: {}", hwmgr_id, e))
            })?;
        let adaptor = self
            .registry
            .get(hwmgr.spec.adaptor_id)
            .ok_or_else(|| InventoryError::Internal(format!("no adaptor registered for {}", hwmgr.spec.adaptor_id)))?;
        Ok((hwmgr, adaptor))
    }

    pub async fn get_resource_pools(&self, hwmgr_id: &str) -> InventoryResponse<ResourcePoolInfo> {
        let result = match self.resolve(hwmgr_id).await {
            Ok((hwmgr, adaptor)) => adaptor.get_resource_pools(&hwmgr).await,
            Err(e) => Err(e),
        };
        result.into()
    }

    pub async fn get_resources(&self, hwmgr_id: &str) -> InventoryResponse<ResourceInfo> {
        let result = match self.resolve(hwmgr_id).await {
            Ok((hwmgr, adaptor)) => adaptor.get_resources(&hwmgr).await,
            Err(e) => Err(e),
        };
        result.into()
    }
}
