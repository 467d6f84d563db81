//! HwMgrClient trait for mocking
//!
//! This trait abstracts the HwMgrClient to enable mocking in unit tests.
//! The concrete HwMgrClient implements this trait, and tests can use mock implementations.

use crate::error::HwMgrError;
use crate::models::*;

/// Trait for hardware manager API client operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait HwMgrClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Validate the API token
    async fn validate_token(&self) -> Result<(), HwMgrError>;

    // Inventory
    async fn get_resource_pools(&self) -> Result<Vec<ResourcePool>, HwMgrError>;
    async fn get_resources(&self) -> Result<Vec<Resource>, HwMgrError>;

    // Allocation
    async fn create_resource_group(&self, request: &ResourceGroupRequest) -> Result<ResourceGroup, HwMgrError>;
    async fn get_resource_group(&self, id: &str) -> Result<ResourceGroup, HwMgrError>;
    async fn delete_resource_group(&self, id: &str) -> Result<(), HwMgrError>;
}
