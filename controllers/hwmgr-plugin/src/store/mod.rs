//! Object store abstraction.
//!
//! The reconciliation core reads and writes cluster objects only through the
//! `ObjectStore` trait. `KubeStore` backs it with the API server; tests use
//! the in-memory `MemoryStore`, which enforces the same resourceVersion
//! optimistic concurrency.
//!
//! Errors are classified by HTTP status so the retry wrapper can tell stale
//! writes (409) and transient failures (429/500/503/504) apart from permanent
//! ones.

mod kube_store;
#[cfg(test)]
pub mod memory;

pub use kube_store::KubeStore;

use kube::Resource;
use crds::{BareMetalHost, HardwareManager, HardwareProfile, Node, NodePool};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by object stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Write rejected because the object changed since it was read
    #[error("conflict: {0}")]
    Conflict(String),

    /// Create rejected because the object already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient API server failure (throttling, unavailable, timeout)
    #[error("retriable store error: {0}")]
    Retriable(String),

    /// Object is missing metadata required for the operation
    #[error("missing metadata: {0}")]
    MissingMetadata(String),

    /// Any other Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[source] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// Transient failure worth retrying immediately
    pub fn is_retriable(&self) -> bool {
        matches!(self, StoreError::Retriable(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(status) => match status.code {
                404 => StoreError::NotFound(status.message.clone()),
                409 if status.reason == "AlreadyExists" => {
                    StoreError::AlreadyExists(status.message.clone())
                }
                409 => StoreError::Conflict(status.message.clone()),
                429 | 500 | 503 | 504 => StoreError::Retriable(status.message.clone()),
                _ => StoreError::Kube(err),
            },
            _ => StoreError::Kube(err),
        }
    }
}

/// Namespaced CRUD over one kind of object.
///
/// `replace` writes metadata and spec, `replace_status` writes only status.
/// Both reject the write with `StoreError::Conflict` when the object carries
/// a stale resourceVersion.
#[async_trait::async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Resource + Clone + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError>;

    /// Lists objects in `namespace`, or across all namespaces when `None`.
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError>;

    async fn create(&self, namespace: &str, obj: &K) -> Result<K, StoreError>;

    async fn replace(&self, namespace: &str, obj: &K) -> Result<K, StoreError>;

    async fn replace_status(&self, namespace: &str, obj: &K) -> Result<K, StoreError>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}

/// One store per kind the controller touches.
#[derive(Clone)]
pub struct Stores {
    pub nodepools: Arc<dyn ObjectStore<NodePool>>,
    pub nodes: Arc<dyn ObjectStore<Node>>,
    pub hardware_managers: Arc<dyn ObjectStore<HardwareManager>>,
    pub hardware_profiles: Arc<dyn ObjectStore<HardwareProfile>>,
    pub config_maps: Arc<dyn ObjectStore<ConfigMap>>,
    pub secrets: Arc<dyn ObjectStore<Secret>>,
    pub bare_metal_hosts: Arc<dyn ObjectStore<BareMetalHost>>,
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

impl Stores {
    /// Stores backed by the API server
    pub fn kube(client: kube::Client) -> Self {
        Self {
            nodepools: Arc::new(KubeStore::new(client.clone())),
            nodes: Arc::new(KubeStore::new(client.clone())),
            hardware_managers: Arc::new(KubeStore::new(client.clone())),
            hardware_profiles: Arc::new(KubeStore::new(client.clone())),
            config_maps: Arc::new(KubeStore::new(client.clone())),
            secrets: Arc::new(KubeStore::new(client.clone())),
            bare_metal_hosts: Arc::new(KubeStore::new(client)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(StoreError::Conflict("x".into()).is_conflict());
        assert!(StoreError::Retriable("x".into()).is_retriable());
        assert!(StoreError::NotFound("x".into()).is_not_found());
        assert!(!StoreError::AlreadyExists("x".into()).is_conflict());
        assert!(!StoreError::MissingMetadata("x".into()).is_retriable());
    }
}
