//! BareMetalHost bookkeeping for the metal3 adaptor.
//!
//! A host is claimed for a NodePool group by labelling it as allocated and
//! annotating it with the owning pool and group. The Node created for a host
//! records the host's namespace and name, which is the link used on release
//! and by the inventory.

use super::{
    ANNOTATION_ALLOCATED_GROUP, ANNOTATION_ALLOCATED_NODEPOOL, LABEL_ALLOCATED, LABEL_PREFIX_INTERFACES,
    LABEL_PREFIX_RESOURCE_SELECTOR, LABEL_RESOURCE_POOL_ID,
};
use crate::adaptors::AdaptorError;
use crate::retry::{retry_on_conflict_or_retriable, RetryPolicy};
use crate::store::{ObjectStore, StoreError};
use crds::{BareMetalHost, Bmc, Interface, Node, NodeGroup, NodePool, ProvisioningState};
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::info;

/// Key used to pair Nodes with their hosts: `namespace/name`
pub fn bmh_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// Node name for a host. Deterministic so a repeated allocation finds the
/// Node it created before.
pub fn node_name_for(bmh: &BareMetalHost) -> String {
    format!("{}-{}", bmh.namespace().unwrap_or_default(), bmh.name_any())
}

/// `namespace/name` of the pool, as stored in the allocation annotation
pub fn nodepool_ref(nodepool: &NodePool) -> String {
    bmh_key(&nodepool.namespace().unwrap_or_default(), &nodepool.name_any())
}

pub fn is_allocated(bmh: &BareMetalHost) -> bool {
    bmh.labels().get(LABEL_ALLOCATED).is_some_and(|v| v == "true")
}

/// Whether the host is claimed by the given pool's group
pub fn is_allocated_to(bmh: &BareMetalHost, nodepool: &NodePool, group: &str) -> bool {
    is_allocated(bmh)
        && bmh.annotations().get(ANNOTATION_ALLOCATED_NODEPOOL) == Some(&nodepool_ref(nodepool))
        && bmh.annotations().get(ANNOTATION_ALLOCATED_GROUP).map(String::as_str) == Some(group)
}

/// Host state in which the Node can be considered provisioned
pub fn is_bmh_ready(bmh: &BareMetalHost) -> bool {
    matches!(
        bmh.provisioning_state(),
        ProvisioningState::Available | ProvisioningState::Provisioned | ProvisioningState::ExternallyProvisioned
    )
}

/// Whether a free host can serve the group: right pool, every resource
/// selector matched by a `resourceselector.oran.openshift.io/` label.
pub fn matches_group(bmh: &BareMetalHost, group: &NodeGroup) -> bool {
    let labels = bmh.labels();
    let data = &group.node_pool_data;
    if labels.get(LABEL_RESOURCE_POOL_ID) != Some(&data.resource_pool_id) {
        return false;
    }
    data.resource_selector.iter().all(|(key, value)| {
        let full = format!("{}{}", LABEL_PREFIX_RESOURCE_SELECTOR, key);
        labels.get(&full) == Some(value)
    })
}

/// Free hosts able to serve the group, sorted by namespace and name
pub fn free_hosts_for_group<'a>(bmhs: &'a [BareMetalHost], group: &NodeGroup) -> Vec<&'a BareMetalHost> {
    let mut hosts: Vec<&BareMetalHost> = bmhs
        .iter()
        .filter(|bmh| bmh.provisioning_state() == ProvisioningState::Available)
        .filter(|bmh| !is_allocated(bmh))
        .filter(|bmh| matches_group(bmh, group))
        .collect();
    hosts.sort_by_key(|bmh| bmh_key(&bmh.namespace().unwrap_or_default(), &bmh.name_any()));
    hosts
}

/// BMC details of a host as recorded on its Node
pub fn bmc_for(bmh: &BareMetalHost) -> Option<Bmc> {
    bmh.spec.bmc.as_ref().map(|bmc| Bmc {
        address: bmc.address.clone(),
        credentials_name: bmc.credentials_name.clone(),
    })
}

/// Interfaces of a host. Labels come from `interfacelabel.oran.openshift.io/<label>`
/// host labels whose value names the interface.
pub fn interfaces_for(bmh: &BareMetalHost) -> Vec<Interface> {
    let labels: BTreeMap<&str, &str> = bmh
        .labels()
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(LABEL_PREFIX_INTERFACES)
                .map(|label| (value.as_str(), label))
        })
        .collect();

    bmh.status
        .as_ref()
        .and_then(|s| s.hardware_details.as_ref())
        .map(|details| {
            details
                .nics
                .iter()
                .map(|nic| Interface {
                    name: nic.name.clone(),
                    label: labels.get(nic.name.as_str()).map(|l| (*l).to_string()).unwrap_or_default(),
                    mac_address: nic.mac.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Nodes keyed by the host they were allocated from
pub fn bmh_to_node_map(nodes: Vec<Node>) -> BTreeMap<String, Node> {
    nodes
        .into_iter()
        .filter(|node| !node.spec.hw_mgr_node_id.is_empty() && !node.spec.hw_mgr_node_ns.is_empty())
        .map(|node| (bmh_key(&node.spec.hw_mgr_node_ns, &node.spec.hw_mgr_node_id), node))
        .collect()
}

/// Claims a host for a pool group. Fails if someone else claimed it first.
pub async fn mark_allocated(
    store: &dyn ObjectStore<BareMetalHost>,
    policy: &RetryPolicy,
    bmh: &BareMetalHost,
    nodepool: &NodePool,
    group: &str,
) -> Result<BareMetalHost, AdaptorError> {
    let namespace = bmh.namespace().unwrap_or_default();
    let name = bmh.name_any();
    let owner = nodepool_ref(nodepool);
    let (namespace, name, owner) = (namespace.as_str(), name.as_str(), owner.as_str());

    retry_on_conflict_or_retriable(policy, || async move {
        let mut fresh = store.get(namespace, name).await?;
        if is_allocated(&fresh) {
            if is_allocated_to(&fresh, nodepool, group) {
                return Ok(fresh);
            }
            return Err(AdaptorError::InsufficientResources(format!(
                "host {}/{} was claimed concurrently",
                namespace, name
            )));
        }
        fresh.labels_mut().insert(LABEL_ALLOCATED.to_string(), "true".to_string());
        fresh
            .annotations_mut()
            .insert(ANNOTATION_ALLOCATED_NODEPOOL.to_string(), owner.to_string());
        fresh
            .annotations_mut()
            .insert(ANNOTATION_ALLOCATED_GROUP.to_string(), group.to_string());
        let updated = store.replace(namespace, &fresh).await?;
        info!("[metal3] Allocated host {}/{} to {} group {}", namespace, name, owner, group);
        Ok(updated)
    })
    .await
}

/// Returns a host to the free pool. A missing host needs no release.
pub async fn clear_allocation(
    store: &dyn ObjectStore<BareMetalHost>,
    policy: &RetryPolicy,
    namespace: &str,
    name: &str,
) -> Result<(), StoreError> {
    let result: Result<(), StoreError> = retry_on_conflict_or_retriable(policy, || async move {
        let mut fresh = store.get(namespace, name).await?;
        if !is_allocated(&fresh) {
            return Ok(());
        }
        fresh.labels_mut().remove(LABEL_ALLOCATED);
        fresh.annotations_mut().remove(ANNOTATION_ALLOCATED_NODEPOOL);
        fresh.annotations_mut().remove(ANNOTATION_ALLOCATED_GROUP);
        store.replace(namespace, &fresh).await?;
        info!("[metal3] Released host {}/{}", namespace, name);
        Ok(())
    })
    .await;

    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}
