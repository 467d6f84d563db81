//! Mock HwMgrClient for unit testing
//!
//! Provides an in-memory implementation of `HwMgrClientTrait` that can be used
//! in unit tests without a running hardware manager. Resource groups are
//! fulfilled from the registered resources when created, but report
//! `IN_PROGRESS` until a test completes or fails them.

use crate::error::HwMgrError;
use crate::hwmgr_trait::HwMgrClientTrait;
use crate::models::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Mock HwMgrClient for testing
#[derive(Debug, Clone, Default)]
pub struct MockHwMgrClient {
    base_url: String,
    resource_pools: Arc<Mutex<Vec<ResourcePool>>>,
    resources: Arc<Mutex<Vec<Resource>>>,
    groups: Arc<Mutex<HashMap<String, ResourceGroup>>>,
    /// Resources reserved for each group, exposed once the group completes
    reserved: Arc<Mutex<HashMap<String, Vec<Resource>>>>,
    unavailable: Arc<AtomicBool>,
    create_calls: Arc<AtomicUsize>,
    delete_calls: Arc<AtomicUsize>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl MockHwMgrClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Register a resource pool
    pub fn add_resource_pool(&self, pool: ResourcePool) {
        lock(&self.resource_pools).push(pool);
    }

    /// Register a resource available for allocation
    pub fn add_resource(&self, resource: Resource) {
        lock(&self.resources).push(resource);
    }

    /// Make every call fail with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Mark a group completed, exposing its reserved resources
    pub fn complete_resource_group(&self, id: &str) {
        let reserved = lock(&self.reserved).get(id).cloned().unwrap_or_default();
        if let Some(group) = lock(&self.groups).get_mut(id) {
            group.status = Some(ResourceGroupStatus {
                state: JobState::Completed,
                message: "resource group allocated".to_string(),
            });
            group.resources = reserved;
        }
    }

    /// Mark a group failed with the given message
    pub fn fail_resource_group(&self, id: &str, message: &str) {
        if let Some(group) = lock(&self.groups).get_mut(id) {
            group.status = Some(ResourceGroupStatus {
                state: JobState::Failed,
                message: message.to_string(),
            });
        }
    }

    /// Ids of the groups currently known to the mock
    pub fn resource_group_ids(&self) -> Vec<String> {
        lock(&self.groups).keys().cloned().collect()
    }

    /// Number of create_resource_group calls
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of delete_resource_group calls, including those for missing groups
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), HwMgrError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(HwMgrError::Unavailable(format!("{} is unreachable", self.base_url)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl HwMgrClientTrait for MockHwMgrClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn validate_token(&self) -> Result<(), HwMgrError> {
        self.check_available()
    }

    async fn get_resource_pools(&self) -> Result<Vec<ResourcePool>, HwMgrError> {
        self.check_available()?;
        Ok(lock(&self.resource_pools).clone())
    }

    async fn get_resources(&self) -> Result<Vec<Resource>, HwMgrError> {
        self.check_available()?;
        Ok(lock(&self.resources).clone())
    }

    async fn create_resource_group(&self, request: &ResourceGroupRequest) -> Result<ResourceGroup, HwMgrError> {
        self.check_available()?;
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let mut reserved = Vec::new();
        {
            let resources = lock(&self.resources);
            for selector in request.resource_selectors.values() {
                let matching = resources
                    .iter()
                    .filter(|r| r.resource_pool_id == selector.resource_pool_id)
                    .filter(|r| !reserved.iter().any(|taken: &Resource| taken.id == r.id))
                    .take(selector.num_resources as usize)
                    .cloned()
                    .collect::<Vec<_>>();
                if matching.len() < selector.num_resources as usize {
                    return Err(HwMgrError::InvalidRequest(format!(
                        "insufficient resources in pool {}",
                        selector.resource_pool_id
                    )));
                }
                reserved.extend(matching.into_iter().map(|mut r| {
                    r.resource_profile_id.clone_from(&selector.resource_profile_id);
                    r
                }));
            }
        }

        let id = format!("rg-{}", uuid::Uuid::new_v4());
        let group = ResourceGroup {
            id: id.clone(),
            name: request.name.clone(),
            status: Some(ResourceGroupStatus {
                state: JobState::InProgress,
                message: "allocation in progress".to_string(),
            }),
            resources: Vec::new(),
        };
        lock(&self.reserved).insert(id.clone(), reserved);
        lock(&self.groups).insert(id, group.clone());
        Ok(group)
    }

    async fn get_resource_group(&self, id: &str) -> Result<ResourceGroup, HwMgrError> {
        self.check_available()?;
        lock(&self.groups)
            .get(id)
            .cloned()
            .ok_or_else(|| HwMgrError::NotFound(format!("resource group {}", id)))
    }

    async fn delete_resource_group(&self, id: &str) -> Result<(), HwMgrError> {
        self.check_available()?;
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.reserved).remove(id);
        lock(&self.groups)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| HwMgrError::NotFound(format!("resource group {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn request(pool: &str, count: u32) -> ResourceGroupRequest {
        let mut resource_selectors = BTreeMap::new();
        resource_selectors.insert(
            "workers".to_string(),
            ResourceSelector {
                resource_pool_id: pool.to_string(),
                resource_profile_id: "profile-a".to_string(),
                num_resources: count,
                role: String::new(),
            },
        );
        ResourceGroupRequest {
            name: "np-1".to_string(),
            description: String::new(),
            resource_type_id: "type-a".to_string(),
            resource_selectors,
        }
    }

    #[tokio::test]
    async fn test_group_exposes_resources_once_completed() {
        let mock = MockHwMgrClient::new("http://hwmgr");
        mock.add_resource(Resource { id: "s1".into(), resource_pool_id: "pool-a".into(), ..Default::default() });
        mock.add_resource(Resource { id: "s2".into(), resource_pool_id: "pool-a".into(), ..Default::default() });

        let group = mock.create_resource_group(&request("pool-a", 2)).await.expect("create group");
        let fetched = mock.get_resource_group(&group.id).await.expect("get group");
        assert_eq!(fetched.state(), JobState::InProgress);
        assert!(fetched.resources.is_empty());

        mock.complete_resource_group(&group.id);
        let fetched = mock.get_resource_group(&group.id).await.expect("get group");
        assert_eq!(fetched.state(), JobState::Completed);
        assert_eq!(fetched.resources.len(), 2);
        assert!(fetched.resources.iter().all(|r| r.resource_profile_id == "profile-a"));
    }

    #[tokio::test]
    async fn test_insufficient_resources_rejected() {
        let mock = MockHwMgrClient::new("http://hwmgr");
        let err = mock.create_resource_group(&request("pool-a", 1)).await.expect_err("no resources");
        assert!(matches!(err, HwMgrError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_group_is_not_found() {
        let mock = MockHwMgrClient::new("http://hwmgr");
        let err = mock.delete_resource_group("rg-missing").await.expect_err("missing group");
        assert!(err.is_not_found());
        assert_eq!(mock.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_is_transient() {
        let mock = MockHwMgrClient::new("http://hwmgr");
        mock.set_unavailable(true);
        let err = mock.get_resource_pools().await.expect_err("unavailable");
        assert!(err.is_transient());
    }
}
