//! Hardware adaptors.
//!
//! Each backend implements the `Adaptor` capability contract: inventory
//! discovery, NodePool allocation for each state the classifier can report,
//! and release on deletion. The reconciler depends only on this trait and
//! looks adaptors up by the HardwareManager's adaptor id, so a new backend
//! only needs an implementation and a registry entry.

pub mod dell;
pub mod loopback;
pub mod metal3;

use crate::fsm::{determine_action, do_not_requeue, NodePoolAction};
use crate::inventory::{InventoryError, ResourceInfo, ResourcePoolInfo};
use crate::nodepool::{list_nodes_for_nodepool, namespace_of};
use crate::retry::{RetryClassify, RetryPolicy};
use crate::store::{ObjectStore, StoreError, Stores};
use crds::{AdaptorId, HardwareManager, Node, NodePool};
use hwmgr_client::HwMgrError;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub type BoxedAdaptor = Arc<dyn Adaptor>;

/// Errors raised by adaptors.
///
/// `is_transient` errors leave the NodePool in progress and are retried
/// later; `is_permanent` errors fail the NodePool until its spec changes.
/// Anything else is returned to the controller for re-delivery.
#[derive(Debug, Error)]
pub enum AdaptorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("hardware manager request failed: {0}")]
    Backend(#[from] HwMgrError),

    /// Malformed or missing configuration (extensions, profiles, credentials)
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Not enough free hardware to satisfy the request
    #[error("insufficient resources: {0}")]
    InsufficientResources(String),

    /// Backend returned data the adaptor cannot use
    #[error("invalid resource data: {0}")]
    InvalidResource(String),

    /// Backend reported the allocation as failed
    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<AdaptorError>,
    },
}

impl AdaptorError {
    /// Prefixes the error with the operation and resource it concerns.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        AdaptorError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            AdaptorError::Store(e) => e.is_conflict() || e.is_retriable(),
            AdaptorError::Backend(e) => e.is_transient(),
            AdaptorError::Context { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    pub fn is_permanent(&self) -> bool {
        match self {
            AdaptorError::InvalidConfig(_)
            | AdaptorError::InsufficientResources(_)
            | AdaptorError::InvalidResource(_)
            | AdaptorError::AllocationFailed(_) => true,
            AdaptorError::Backend(e) => {
                matches!(e, HwMgrError::InvalidRequest(_) | HwMgrError::NotFound(_))
            }
            AdaptorError::Context { source, .. } => source.is_permanent(),
            AdaptorError::Store(_) => false,
        }
    }
}

impl RetryClassify for AdaptorError {
    fn is_conflict(&self) -> bool {
        match self {
            AdaptorError::Store(e) => e.is_conflict(),
            AdaptorError::Context { source, .. } => source.is_conflict(),
            _ => false,
        }
    }

    fn is_retriable(&self) -> bool {
        match self {
            AdaptorError::Store(e) => e.is_retriable(),
            AdaptorError::Context { source, .. } => source.is_retriable(),
            _ => false,
        }
    }

    fn is_not_found(&self) -> bool {
        match self {
            AdaptorError::Store(e) => e.is_not_found(),
            AdaptorError::Context { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Shared state handed to every adaptor.
#[derive(Debug, Clone)]
pub struct AdaptorContext {
    pub stores: Stores,
    /// Namespace holding HardwareManagers, HardwareProfiles and adaptor config
    pub namespace: String,
    pub retry: RetryPolicy,
}

/// Capability contract implemented once per backend.
#[async_trait::async_trait]
pub trait Adaptor: Send + Sync {
    fn adaptor_id(&self) -> AdaptorId;

    fn context(&self) -> &AdaptorContext;

    /// Checks that the backend described by the HardwareManager is usable.
    async fn validate_hardware_manager(&self, _hwmgr: &HardwareManager) -> Result<(), AdaptorError> {
        Ok(())
    }

    async fn get_resource_pools(&self, hwmgr: &HardwareManager) -> Result<Vec<ResourcePoolInfo>, InventoryError>;

    async fn get_resources(&self, hwmgr: &HardwareManager) -> Result<Vec<ResourceInfo>, InventoryError>;

    async fn handle_nodepool_create(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<Action, AdaptorError>;

    async fn handle_nodepool_processing(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<Action, AdaptorError>;

    async fn handle_nodepool_spec_changed(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<Action, AdaptorError>;

    /// Returns one allocated Node to the backend. Releasing a Node that was
    /// already released must succeed.
    async fn release_node(&self, hwmgr: &HardwareManager, nodepool: &NodePool, node: &Node) -> Result<(), AdaptorError>;

    /// Releases every Node of the pool. Returns whether the pool is fully
    /// released and its finalizer may be removed.
    async fn handle_nodepool_deletion(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<bool, AdaptorError> {
        info!("[{}] Finalizing nodepool {}", self.adaptor_id(), nodepool.name_any());
        let nodes = list_nodes_for_nodepool(self.context().stores.nodes.as_ref(), nodepool).await?;

        let mut first_error = None;
        for node in &nodes {
            if let Err(e) = self.release_node(hwmgr, nodepool, node).await {
                warn!("[{}] Failed to release node {}: {}", self.adaptor_id(), node.name_any(), e);
                first_error.get_or_insert(e.context(format!("failed to release node {}", node.name_any())));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(true),
        }
    }

    /// Classifies the NodePool and runs the matching handler.
    async fn handle_nodepool(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<Action, AdaptorError> {
        let action = determine_action(nodepool);
        info!("[{}] Nodepool {} action: {:?}", self.adaptor_id(), nodepool.name_any(), action);

        match action {
            NodePoolAction::Create => self.handle_nodepool_create(hwmgr, nodepool).await,
            NodePoolAction::Processing => self.handle_nodepool_processing(hwmgr, nodepool).await,
            NodePoolAction::SpecChanged => self.handle_nodepool_spec_changed(hwmgr, nodepool).await,
            NodePoolAction::Failed | NodePoolAction::Noop => Ok(do_not_requeue()),
        }
    }
}

/// Name of the Secret holding a node's BMC credentials
pub fn bmc_secret_name(node_name: &str) -> String {
    format!("{}-bmc-secret", node_name)
}

/// Creates the BMC credentials Secret for a node next to its NodePool.
/// An existing Secret of the same name is kept.
pub async fn create_bmc_secret(
    store: &dyn ObjectStore<Secret>,
    nodepool: &NodePool,
    node_name: &str,
    data: BTreeMap<String, Vec<u8>>,
) -> Result<String, StoreError> {
    let namespace = namespace_of(nodepool)?;
    let name = bmc_secret_name(node_name);

    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.clone()),
            owner_references: nodepool.owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        },
        data: Some(data.into_iter().map(|(k, v)| (k, ByteString(v))).collect()),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    };

    match store.create(&namespace, &secret).await {
        Ok(_) => {
            info!("Created BMC secret {}/{}", namespace, name);
            Ok(name)
        }
        Err(e) if e.is_already_exists() => Ok(name),
        Err(e) => Err(e),
    }
}

/// Deletes a node's BMC credentials Secret; a missing Secret is not an error.
pub async fn delete_bmc_secret(store: &dyn ObjectStore<Secret>, namespace: &str, name: &str) -> Result<(), StoreError> {
    match store.delete(namespace, name).await {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// Adaptors keyed by id.
#[derive(Clone, Default)]
pub struct AdaptorRegistry {
    adaptors: HashMap<AdaptorId, BoxedAdaptor>,
}

impl std::fmt::Debug for AdaptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.adaptors.keys()).finish()
    }
}

impl AdaptorRegistry {
    /// Registry with the loopback, metal3 and dell-hwmgr adaptors.
    pub fn with_builtin(ctx: &AdaptorContext, dell_clients: Arc<dyn dell::ClientFactory>) -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(loopback::LoopbackAdaptor::new(ctx.clone())));
        registry.register(Arc::new(metal3::Metal3Adaptor::new(ctx.clone())));
        registry.register(Arc::new(dell::DellAdaptor::new(ctx.clone(), dell_clients)));
        registry
    }

    pub fn register(&mut self, adaptor: BoxedAdaptor) {
        self.adaptors.insert(adaptor.adaptor_id(), adaptor);
    }

    pub fn get(&self, id: AdaptorId) -> Option<BoxedAdaptor> {
        self.adaptors.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification_through_context() {
        let transient = AdaptorError::Backend(HwMgrError::Unavailable("503".into())).context("polling rg-1");
        assert!(transient.is_transient());
        assert!(!transient.is_permanent());
        assert!(transient.to_string().starts_with("polling rg-1: "));

        let permanent = AdaptorError::InvalidConfig("missing resourceTypeId".into()).context("nodepool np-1");
        assert!(permanent.is_permanent());
        assert!(!permanent.is_transient());

        let conflict = AdaptorError::Store(StoreError::Conflict("stale".into()));
        assert!(conflict.is_transient());

        let forbidden = AdaptorError::Store(StoreError::MissingMetadata("no uid".into()));
        assert!(!forbidden.is_transient());
        assert!(!forbidden.is_permanent());
    }
}
