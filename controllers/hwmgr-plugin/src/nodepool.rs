//! NodePool and Node helpers shared by the reconciler and the adaptors.
//!
//! Every status write goes through the retry wrapper: the closure re-reads the
//! object, applies the mutation to the fresh copy and writes it back, so a
//! concurrent writer never has its changes overwritten with stale data.

use crate::conditions::{find_status_condition, set_status_condition};
use crate::retry::{retry_on_conflict_or_retriable, retry_on_conflict_or_retriable_or_not_found, RetryPolicy};
use crate::store::{ObjectStore, StoreError};
use crds::{
    Condition, ConditionReason, ConditionStatus, ConditionType, Node, NodePool, NodePoolStatus, NodeSpec,
    NodeStatus, CONFIG_SUCCESS_MESSAGE,
};
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Finalizer blocking NodePool removal until its hardware is released
pub const NODEPOOL_FINALIZER: &str = "oran-hwmgr-plugin/nodepool-finalizer";

/// Extension key carrying the backend resource type identifier
pub const RESOURCE_TYPE_ID_KEY: &str = "resourceTypeId";

/// Namespace of an object, or an error naming the object
pub fn namespace_of<K: Resource<DynamicType = ()>>(obj: &K) -> Result<String, StoreError> {
    obj.namespace()
        .ok_or_else(|| StoreError::MissingMetadata(format!("{} {} has no namespace", K::kind(&()), obj.name_any())))
}

pub fn get_resource_type_id(nodepool: &NodePool) -> Option<&str> {
    nodepool
        .spec
        .extensions
        .get(RESOURCE_TYPE_ID_KEY)
        .map(String::as_str)
        .filter(|id| !id.is_empty())
}

pub fn get_provisioned_condition(nodepool: &NodePool) -> Option<&Condition> {
    find_status_condition(nodepool.conditions(), ConditionType::Provisioned)
}

pub fn is_provisioned_completed(nodepool: &NodePool) -> bool {
    get_provisioned_condition(nodepool).is_some_and(|c| {
        c.status == ConditionStatus::True && c.reason == ConditionReason::Completed.as_str()
    })
}

pub fn is_provisioned_failed(nodepool: &NodePool) -> bool {
    get_provisioned_condition(nodepool).is_some_and(|c| c.reason == ConditionReason::Failed.as_str())
}

/// Fresh read, status mutation, conditional status write.
async fn mutate_nodepool_status<F>(
    store: &dyn ObjectStore<NodePool>,
    policy: &RetryPolicy,
    nodepool: &NodePool,
    mutate: F,
) -> Result<NodePool, StoreError>
where
    F: Fn(&mut NodePoolStatus) + Sync,
{
    let namespace = namespace_of(nodepool)?;
    let name = nodepool.name_any();
    let (namespace, name, mutate) = (&namespace, &name, &mutate);

    retry_on_conflict_or_retriable(policy, || async move {
        let mut fresh = store.get(namespace, name).await?;
        let before = fresh.status.clone();
        mutate(fresh.status.get_or_insert_with(NodePoolStatus::default));
        if fresh.status == before {
            return Ok(fresh);
        }
        store.replace_status(namespace, &fresh).await
    })
    .await
}

/// Sets a condition on the stored NodePool.
pub async fn update_nodepool_status_condition(
    store: &dyn ObjectStore<NodePool>,
    policy: &RetryPolicy,
    nodepool: &NodePool,
    condition_type: ConditionType,
    reason: impl AsRef<str>,
    status: ConditionStatus,
    message: impl Into<String>,
) -> Result<NodePool, StoreError> {
    let reason = reason.as_ref();
    let message = message.into();
    debug!(
        "Setting {} {}/{} on nodepool {}",
        condition_type,
        status,
        reason,
        nodepool.name_any()
    );
    mutate_nodepool_status(store, policy, nodepool, |status_block| {
        set_status_condition(&mut status_block.conditions, condition_type, reason, status, message.clone());
    })
    .await
}

/// Merges properties into the stored NodePool's status.
pub async fn update_nodepool_properties(
    store: &dyn ObjectStore<NodePool>,
    policy: &RetryPolicy,
    nodepool: &NodePool,
    properties: &BTreeMap<String, String>,
) -> Result<NodePool, StoreError> {
    mutate_nodepool_status(store, policy, nodepool, |status| {
        status
            .properties
            .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
    })
    .await
}

/// Records the resource pool chosen for each node group.
pub async fn update_nodepool_selected_pools(
    store: &dyn ObjectStore<NodePool>,
    policy: &RetryPolicy,
    nodepool: &NodePool,
    selected_pools: &BTreeMap<String, String>,
) -> Result<NodePool, StoreError> {
    mutate_nodepool_status(store, policy, nodepool, |status| {
        status.selected_pools.clone_from(selected_pools);
    })
    .await
}

/// Moves the NodePool to a terminal Provisioned state (Completed or Failed)
/// and records the reconciled generation in the same write.
pub async fn complete_nodepool_transition(
    store: &dyn ObjectStore<NodePool>,
    policy: &RetryPolicy,
    nodepool: &NodePool,
    reason: ConditionReason,
    status: ConditionStatus,
    message: impl Into<String>,
) -> Result<NodePool, StoreError> {
    let generation = nodepool.generation();
    let message = message.into();
    info!(
        "NodePool {} provisioning {} (generation {}): {}",
        nodepool.name_any(),
        reason,
        generation,
        message
    );
    mutate_nodepool_status(store, policy, nodepool, |status_block| {
        set_status_condition(
            &mut status_block.conditions,
            ConditionType::Provisioned,
            reason,
            status,
            message.clone(),
        );
        status_block.hw_mgr_plugin.observed_generation = generation;
    })
    .await
}

/// Projects child Node Configured conditions onto the pool.
///
/// Nodes are re-read one by one. The first node that cannot be read, lacks a
/// Configured condition, or reports anything but ConfigApplied decides the
/// result and ends the scan. Unreadable nodes count as in progress, never as
/// success.
pub async fn derive_nodepool_status_from_nodes(
    store: &dyn ObjectStore<Node>,
    nodes: &[Node],
) -> (ConditionStatus, String, String) {
    for node in nodes {
        let name = node.name_any();
        let namespace = node.namespace().unwrap_or_default();

        let updated = match store.get(&namespace, &name).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!("Failed to read node {}: {}", name, e);
                return (
                    ConditionStatus::False,
                    ConditionReason::InProgress.to_string(),
                    format!("Node {} could not be read", name),
                );
            }
        };

        let Some(cond) = find_status_condition(updated.conditions(), ConditionType::Configured) else {
            return (
                ConditionStatus::False,
                ConditionReason::InProgress.to_string(),
                format!("Node {} missing Configured condition", name),
            );
        };

        if cond.reason != ConditionReason::ConfigApplied.as_str() {
            return (cond.status, cond.reason.clone(), format!("Node {}: {}", name, cond.message));
        }
    }

    (
        ConditionStatus::True,
        ConditionReason::ConfigApplied.to_string(),
        CONFIG_SUCCESS_MESSAGE.to_string(),
    )
}

pub fn has_finalizer(nodepool: &NodePool) -> bool {
    nodepool.finalizers().iter().any(|f| f == NODEPOOL_FINALIZER)
}

pub fn is_being_deleted(nodepool: &NodePool) -> bool {
    nodepool.meta().deletion_timestamp.is_some()
}

/// Adds the finalizer to the stored NodePool if missing.
pub async fn add_finalizer(
    store: &dyn ObjectStore<NodePool>,
    policy: &RetryPolicy,
    nodepool: &NodePool,
) -> Result<NodePool, StoreError> {
    let namespace = namespace_of(nodepool)?;
    let name = nodepool.name_any();
    let (namespace, name) = (&namespace, &name);

    retry_on_conflict_or_retriable(policy, || async move {
        let mut fresh = store.get(namespace, name).await?;
        if has_finalizer(&fresh) {
            return Ok(fresh);
        }
        fresh.finalizers_mut().push(NODEPOOL_FINALIZER.to_string());
        info!("Adding finalizer to nodepool {}/{}", namespace, name);
        store.replace(namespace, &fresh).await
    })
    .await
}

/// Removes the finalizer from the stored NodePool. A NodePool that is
/// already gone needs no finalizer removal.
pub async fn remove_finalizer(
    store: &dyn ObjectStore<NodePool>,
    policy: &RetryPolicy,
    nodepool: &NodePool,
) -> Result<(), StoreError> {
    let namespace = namespace_of(nodepool)?;
    let name = nodepool.name_any();
    let (namespace, name) = (&namespace, &name);

    let result = retry_on_conflict_or_retriable(policy, || async move {
        let mut fresh = store.get(namespace, name).await?;
        if !has_finalizer(&fresh) {
            return Ok(());
        }
        fresh.finalizers_mut().retain(|f| f != NODEPOOL_FINALIZER);
        info!("Removing finalizer from nodepool {}/{}", namespace, name);
        store.replace(namespace, &fresh).await.map(|_| ())
    })
    .await;

    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// Nodes allocated to a NodePool
pub async fn list_nodes_for_nodepool(
    store: &dyn ObjectStore<Node>,
    nodepool: &NodePool,
) -> Result<Vec<Node>, StoreError> {
    let namespace = namespace_of(nodepool)?;
    let name = nodepool.name_any();
    let uid = nodepool.uid();

    Ok(store
        .list(Some(&namespace))
        .await?
        .into_iter()
        .filter(|node| node.spec.node_pool == name)
        .filter(|node| {
            uid.is_none() || node.owner_references().iter().any(|o| Some(&o.uid) == uid.as_ref())
        })
        .collect())
}

/// Creates a Node owned by the NodePool. An existing Node of the same name
/// is returned unchanged.
pub async fn create_node(
    store: &dyn ObjectStore<Node>,
    nodepool: &NodePool,
    name: &str,
    spec: NodeSpec,
) -> Result<Node, StoreError> {
    let namespace = namespace_of(nodepool)?;

    match store.get(&namespace, name).await {
        Ok(existing) => {
            debug!("Node {}/{} already exists, skipping create", namespace, name);
            return Ok(existing);
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }

    let owner = nodepool
        .controller_owner_ref(&())
        .ok_or_else(|| StoreError::MissingMetadata(format!("nodepool {} has no uid", nodepool.name_any())))?;

    let node = Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.clone()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec,
        status: None,
    };

    info!("Creating node {}/{} for nodepool {}", namespace, name, nodepool.name_any());
    match store.create(&namespace, &node).await {
        Ok(created) => Ok(created),
        Err(e) if e.is_already_exists() => store.get(&namespace, name).await,
        Err(e) => Err(e),
    }
}

/// Applies a status mutation to the stored Node. The first read tolerates a
/// Node whose create is not yet visible.
pub async fn update_node_status<F>(
    store: &dyn ObjectStore<Node>,
    policy: &RetryPolicy,
    namespace: &str,
    name: &str,
    mutate: F,
) -> Result<Node, StoreError>
where
    F: Fn(&mut NodeStatus) + Sync,
{
    let mutate = &mutate;
    retry_on_conflict_or_retriable_or_not_found(policy, || async move {
        let mut fresh = store.get(namespace, name).await?;
        mutate(fresh.status.get_or_insert_with(NodeStatus::default));
        store.replace_status(namespace, &fresh).await
    })
    .await
}

/// Marks a Node's provisioning as failed. A Node whose Provisioned
/// condition is already True is left untouched.
pub async fn set_node_failed_status(
    store: &dyn ObjectStore<Node>,
    policy: &RetryPolicy,
    node: &Node,
    message: &str,
) -> Result<Node, StoreError> {
    let namespace = node.namespace().unwrap_or_default();
    warn!("Node {}/{} failed: {}", namespace, node.name_any(), message);
    update_node_status(store, policy, &namespace, &node.name_any(), |status| {
        if crate::conditions::is_status_condition_true(&status.conditions, ConditionType::Provisioned) {
            return;
        }
        set_status_condition(
            &mut status.conditions,
            ConditionType::Provisioned,
            ConditionReason::Failed,
            ConditionStatus::False,
            message,
        );
    })
    .await
}

/// Whether a Node's Provisioned condition is True
pub fn is_node_provisioned(node: &Node) -> bool {
    crate::conditions::is_status_condition_true(node.conditions(), ConditionType::Provisioned)
}

/// Total number of nodes requested across all groups
pub fn requested_node_count(nodepool: &NodePool) -> usize {
    nodepool.spec.node_group.iter().map(|g| g.size as usize).sum()
}

#[cfg(test)]
#[path = "nodepool_test.rs"]
mod nodepool_test;
