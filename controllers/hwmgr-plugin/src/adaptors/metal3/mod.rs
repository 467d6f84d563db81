//! Metal3 adaptor.
//!
//! Allocates BareMetalHosts discovered by metal3. Hosts are chosen by their
//! resource pool label and resource selector labels, claimed with an
//! allocation label, and tracked through provisioning until they reach a
//! ready state. Allocation is asynchronous: Create claims hosts and leaves the
//! NodePool in progress, Processing completes it once every host is ready.

pub mod inventory;
pub mod node;

use super::{Adaptor, AdaptorContext, AdaptorError};
use crate::conditions::{find_status_condition, set_status_condition};
use crate::fsm::{do_not_requeue, requeue_with_short_interval};
use crate::inventory::{InventoryError, ResourceInfo, ResourcePoolInfo};
use crate::nodepool::{
    complete_nodepool_transition, create_node, is_node_provisioned, list_nodes_for_nodepool, namespace_of,
    requested_node_count, set_node_failed_status, update_node_status, update_nodepool_selected_pools,
    update_nodepool_status_condition,
};
use crate::retry::retry_on_conflict_or_retriable;
use crds::{
    AdaptorId, BareMetalHost, ConditionReason, ConditionStatus, ConditionType, HardwareManager, Node, NodeGroup,
    NodePool, NodeSpec, CONFIG_SUCCESS_MESSAGE,
};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use node::{
    bmc_for, bmh_to_node_map, clear_allocation, free_hosts_for_group, interfaces_for, is_allocated_to, is_bmh_ready,
    mark_allocated, node_name_for,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Resource pool a host belongs to
pub const LABEL_RESOURCE_POOL_ID: &str = "resources.oran.openshift.io/resourcePoolId";
/// Site a host is located at
pub const LABEL_SITE_ID: &str = "resources.oran.openshift.io/siteId";

pub const LABEL_PREFIX_RESOURCE_SELECTOR: &str = "resourceselector.oran.openshift.io/";
pub const LABEL_PREFIX_INTERFACES: &str = "interfacelabel.oran.openshift.io/";

pub const ANNOTATION_RESOURCE_INFO_DESCRIPTION: &str = "resourceinfo.oran.openshift.io/description";
pub const ANNOTATION_RESOURCE_INFO_PART_NUMBER: &str = "resourceinfo.oran.openshift.io/partNumber";
pub const ANNOTATION_RESOURCE_INFO_GLOBAL_ASSET_ID: &str = "resourceinfo.oran.openshift.io/globalAssetId";
pub const ANNOTATION_RESOURCE_INFO_GROUPS: &str = "resourceinfo.oran.openshift.io/groups";

pub const LABEL_ALLOCATED: &str = "hwmgr-plugin.oran.openshift.io/allocated";
pub const ANNOTATION_ALLOCATED_NODEPOOL: &str = "hwmgr-plugin.oran.openshift.io/nodepool";
pub const ANNOTATION_ALLOCATED_GROUP: &str = "hwmgr-plugin.oran.openshift.io/group";

/// Outcome of checking one Node against its host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeProgress {
    Done,
    Pending,
}

pub struct Metal3Adaptor {
    ctx: AdaptorContext,
}

impl Metal3Adaptor {
    pub fn new(ctx: AdaptorContext) -> Self {
        Self { ctx }
    }

    async fn list_hosts(&self) -> Result<Vec<BareMetalHost>, AdaptorError> {
        Ok(self.ctx.stores.bare_metal_hosts.list(None).await?)
    }

    /// Every group's HardwareProfile must exist before hosts are touched.
    async fn validate_profiles(&self, nodepool: &NodePool) -> Result<(), AdaptorError> {
        let profiles: BTreeSet<&str> = nodepool
            .spec
            .node_group
            .iter()
            .map(|g| g.node_pool_data.hw_profile.as_str())
            .collect();

        for profile in profiles {
            match self.ctx.stores.hardware_profiles.get(&self.ctx.namespace, profile).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    return Err(AdaptorError::InvalidConfig(format!(
                        "hardware profile {} not found in {}",
                        profile, self.ctx.namespace
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Claims hosts so every group reaches its requested size. Capacity is
    /// checked for all groups before any host is claimed. Returns whether
    /// new hosts were claimed.
    async fn allocate_missing(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<bool, AdaptorError> {
        let bmhs = self.list_hosts().await?;

        let mut plan: Vec<(&NodeGroup, &BareMetalHost)> = Vec::new();
        let mut claimed: BTreeSet<String> = BTreeSet::new();
        for group in &nodepool.spec.node_group {
            let group_name = &group.node_pool_data.name;
            let owned: Vec<&BareMetalHost> = bmhs
                .iter()
                .filter(|bmh| is_allocated_to(bmh, nodepool, group_name))
                .collect();

            for bmh in &owned {
                self.ensure_node(hwmgr, nodepool, group, bmh).await?;
            }

            let wanted = (group.size as usize).saturating_sub(owned.len());
            if owned.len() > group.size as usize {
                warn!(
                    "[metal3] Group {} of nodepool {} has {} hosts, scale-down is not supported",
                    group_name,
                    nodepool.name_any(),
                    owned.len()
                );
            }
            if wanted == 0 {
                continue;
            }

            let free: Vec<&BareMetalHost> = free_hosts_for_group(&bmhs, group)
                .into_iter()
                .filter(|bmh| !claimed.contains(&node_name_for(bmh)))
                .take(wanted)
                .collect();
            if free.len() < wanted {
                return Err(AdaptorError::InsufficientResources(format!(
                    "resource pool {} has {} matching hosts available, {} requested for group {}",
                    group.node_pool_data.resource_pool_id,
                    free.len(),
                    wanted,
                    group_name
                )));
            }
            for bmh in free {
                claimed.insert(node_name_for(bmh));
                plan.push((group, bmh));
            }
        }

        let allocated = !plan.is_empty();
        for (group, bmh) in plan {
            let marked = mark_allocated(
                self.ctx.stores.bare_metal_hosts.as_ref(),
                &self.ctx.retry,
                bmh,
                nodepool,
                &group.node_pool_data.name,
            )
            .await?;
            self.ensure_node(hwmgr, nodepool, group, &marked).await?;
        }

        let selected_pools: BTreeMap<String, String> = nodepool
            .spec
            .node_group
            .iter()
            .map(|g| (g.node_pool_data.name.clone(), g.node_pool_data.resource_pool_id.clone()))
            .collect();
        update_nodepool_selected_pools(
            self.ctx.stores.nodepools.as_ref(),
            &self.ctx.retry,
            nodepool,
            &selected_pools,
        )
        .await?;

        Ok(allocated)
    }

    /// Creates the Node for a claimed host and seeds its status.
    async fn ensure_node(
        &self,
        hwmgr: &HardwareManager,
        nodepool: &NodePool,
        group: &NodeGroup,
        bmh: &BareMetalHost,
    ) -> Result<(), AdaptorError> {
        let name = node_name_for(bmh);
        let spec = NodeSpec {
            node_pool: nodepool.name_any(),
            group_name: group.node_pool_data.name.clone(),
            hw_profile: group.node_pool_data.hw_profile.clone(),
            hw_mgr_id: hwmgr.name_any(),
            hw_mgr_node_id: bmh.name_any(),
            hw_mgr_node_ns: bmh.namespace().unwrap_or_default(),
        };
        let node = create_node(self.ctx.stores.nodes.as_ref(), nodepool, &name, spec).await?;
        if find_status_condition(node.conditions(), ConditionType::Provisioned).is_some() {
            return Ok(());
        }

        let bmc = bmc_for(bmh);
        let interfaces = interfaces_for(bmh);
        let namespace = namespace_of(nodepool)?;
        update_node_status(self.ctx.stores.nodes.as_ref(), &self.ctx.retry, &namespace, &name, |status| {
            status.bmc.clone_from(&bmc);
            status.interfaces.clone_from(&interfaces);
            set_status_condition(
                &mut status.conditions,
                ConditionType::Provisioned,
                ConditionReason::InProgress,
                ConditionStatus::False,
                "Hardware provisioning in progress",
            );
        })
        .await?;
        Ok(())
    }

    /// Advances one Node: completes provisioning or applies a pending
    /// hardware profile once its host is ready.
    async fn progress_node(&self, node: &Node) -> Result<NodeProgress, AdaptorError> {
        let nodes = self.ctx.stores.nodes.as_ref();
        let namespace = node.namespace().unwrap_or_default();
        let name = node.name_any();

        let bmh = match self
            .ctx
            .stores
            .bare_metal_hosts
            .get(&node.spec.hw_mgr_node_ns, &node.spec.hw_mgr_node_id)
            .await
        {
            Ok(bmh) => bmh,
            Err(e) if e.is_not_found() => {
                let message = format!(
                    "BareMetalHost {}/{} not found",
                    node.spec.hw_mgr_node_ns, node.spec.hw_mgr_node_id
                );
                set_node_failed_status(nodes, &self.ctx.retry, node, &message).await?;
                return Err(AdaptorError::AllocationFailed(format!("node {}: {}", name, message)));
            }
            Err(e) => return Err(e.into()),
        };

        let applied_profile = node.status.as_ref().map(|s| s.hw_profile.as_str()).unwrap_or_default();
        let profile_pending = applied_profile != node.spec.hw_profile;
        if is_node_provisioned(node) && !profile_pending {
            return Ok(NodeProgress::Done);
        }

        let profile = node.spec.hw_profile.clone();
        if !is_bmh_ready(&bmh) {
            debug!(
                "[metal3] Host {} for node {} is {:?}",
                bmh.name_any(),
                name,
                bmh.provisioning_state()
            );
            if is_node_provisioned(node) {
                update_node_status(nodes, &self.ctx.retry, &namespace, &name, |status| {
                    set_status_condition(
                        &mut status.conditions,
                        ConditionType::Configured,
                        ConditionReason::ConfigUpdate,
                        ConditionStatus::False,
                        format!("Waiting to apply hardware profile {}", profile),
                    );
                })
                .await?;
            }
            return Ok(NodeProgress::Pending);
        }

        info!("[metal3] Node {} ready with hardware profile {}", name, profile);
        update_node_status(nodes, &self.ctx.retry, &namespace, &name, |status| {
            status.hw_profile.clone_from(&profile);
            set_status_condition(
                &mut status.conditions,
                ConditionType::Provisioned,
                ConditionReason::Completed,
                ConditionStatus::True,
                "Provisioned",
            );
            set_status_condition(
                &mut status.conditions,
                ConditionType::Configured,
                ConditionReason::ConfigApplied,
                ConditionStatus::True,
                CONFIG_SUCCESS_MESSAGE,
            );
        })
        .await?;
        Ok(NodeProgress::Done)
    }

    /// Walks the pool's Nodes; completes the pool once all of them are done.
    async fn progress_nodepool(&self, nodepool: &NodePool, message: &str) -> Result<Action, AdaptorError> {
        let nodes = list_nodes_for_nodepool(self.ctx.stores.nodes.as_ref(), nodepool).await?;

        let mut pending = 0;
        for node in &nodes {
            if self.progress_node(node).await? == NodeProgress::Pending {
                pending += 1;
            }
        }

        let requested = requested_node_count(nodepool);
        let store = self.ctx.stores.nodepools.as_ref();
        if pending > 0 || nodes.len() < requested {
            update_nodepool_status_condition(
                store,
                &self.ctx.retry,
                nodepool,
                ConditionType::Provisioned,
                ConditionReason::InProgress,
                ConditionStatus::False,
                format!("{} of {} nodes ready", nodes.len() - pending, requested),
            )
            .await?;
            return Ok(requeue_with_short_interval());
        }

        update_nodepool_status_condition(
            store,
            &self.ctx.retry,
            nodepool,
            ConditionType::Configured,
            ConditionReason::ConfigApplied,
            ConditionStatus::True,
            CONFIG_SUCCESS_MESSAGE,
        )
        .await?;
        complete_nodepool_transition(
            store,
            &self.ctx.retry,
            nodepool,
            ConditionReason::Completed,
            ConditionStatus::True,
            message,
        )
        .await?;
        Ok(do_not_requeue())
    }

    /// Points Nodes of groups whose profile changed at the new profile.
    async fn update_node_profiles(&self, nodepool: &NodePool) -> Result<bool, AdaptorError> {
        let store = self.ctx.stores.nodes.as_ref();
        let namespace = namespace_of(nodepool)?;
        let mut changed = false;

        for node in list_nodes_for_nodepool(store, nodepool).await? {
            let Some(group) = nodepool
                .spec
                .node_group
                .iter()
                .find(|g| g.node_pool_data.name == node.spec.group_name)
            else {
                continue;
            };
            let profile = group.node_pool_data.hw_profile.as_str();
            if node.spec.hw_profile == profile {
                continue;
            }

            let name = node.name_any();
            info!("[metal3] Node {} moves to hardware profile {}", name, profile);
            let (namespace_ref, name_ref) = (namespace.as_str(), name.as_str());
            retry_on_conflict_or_retriable(&self.ctx.retry, || async move {
                let mut fresh = store.get(namespace_ref, name_ref).await?;
                fresh.spec.hw_profile = profile.to_string();
                store.replace(namespace_ref, &fresh).await
            })
            .await?;
            changed = true;
        }
        Ok(changed)
    }
}

#[async_trait::async_trait]
impl Adaptor for Metal3Adaptor {
    fn adaptor_id(&self) -> AdaptorId {
        AdaptorId::Metal3
    }

    fn context(&self) -> &AdaptorContext {
        &self.ctx
    }

    async fn get_resource_pools(&self, _hwmgr: &HardwareManager) -> Result<Vec<ResourcePoolInfo>, InventoryError> {
        let bmhs = self
            .list_hosts()
            .await
            .map_err(|e| InventoryError::Internal(format!("failed to get bmh list: {}", e)))?;
        Ok(inventory::resource_pools(&bmhs))
    }

    async fn get_resources(&self, _hwmgr: &HardwareManager) -> Result<Vec<ResourceInfo>, InventoryError> {
        let nodes = self
            .ctx
            .stores
            .nodes
            .list(None)
            .await
            .map_err(|e| InventoryError::Internal(format!("failed to query current nodes: {}", e)))?;
        let nodes = bmh_to_node_map(nodes);

        let bmhs = self
            .list_hosts()
            .await
            .map_err(|e| InventoryError::Internal(format!("failed to get bmh list: {}", e)))?;

        Ok(bmhs
            .iter()
            .filter(|bmh| inventory::include_in_inventory(bmh))
            .map(|bmh| {
                let key = node::bmh_key(&bmh.namespace().unwrap_or_default(), &bmh.name_any());
                inventory::resource_info(bmh, nodes.get(&key))
            })
            .collect())
    }

    async fn handle_nodepool_create(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<Action, AdaptorError> {
        info!("[metal3] Allocating hosts for nodepool {}", nodepool.name_any());
        self.validate_profiles(nodepool).await?;
        self.allocate_missing(hwmgr, nodepool).await?;

        update_nodepool_status_condition(
            self.ctx.stores.nodepools.as_ref(),
            &self.ctx.retry,
            nodepool,
            ConditionType::Provisioned,
            ConditionReason::InProgress,
            ConditionStatus::False,
            "Creating nodes",
        )
        .await?;
        Ok(requeue_with_short_interval())
    }

    async fn handle_nodepool_processing(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<Action, AdaptorError> {
        debug!("[metal3] Checking progress of nodepool {}", nodepool.name_any());
        self.allocate_missing(hwmgr, nodepool).await?;
        self.progress_nodepool(nodepool, "Created").await
    }

    async fn handle_nodepool_spec_changed(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<Action, AdaptorError> {
        info!("[metal3] Applying spec change to nodepool {}", nodepool.name_any());
        self.validate_profiles(nodepool).await?;
        let scaled = self.allocate_missing(hwmgr, nodepool).await?;
        let reprofiled = self.update_node_profiles(nodepool).await?;

        if reprofiled {
            update_nodepool_status_condition(
                self.ctx.stores.nodepools.as_ref(),
                &self.ctx.retry,
                nodepool,
                ConditionType::Configured,
                ConditionReason::ConfigUpdate,
                ConditionStatus::False,
                "Hardware profile update requested",
            )
            .await?;
        }
        if scaled || reprofiled {
            debug!("[metal3] Nodepool {} scaled={} reprofiled={}", nodepool.name_any(), scaled, reprofiled);
        }

        self.progress_nodepool(nodepool, "Updated").await
    }

    async fn release_node(&self, _hwmgr: &HardwareManager, _nodepool: &NodePool, node: &Node) -> Result<(), AdaptorError> {
        if node.spec.hw_mgr_node_id.is_empty() {
            return Ok(());
        }
        clear_allocation(
            self.ctx.stores.bare_metal_hosts.as_ref(),
            &self.ctx.retry,
            &node.spec.hw_mgr_node_ns,
            &node.spec.hw_mgr_node_id,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::{determine_action, NodePoolAction};
    use crate::nodepool::{is_provisioned_completed, is_provisioned_failed};
    use crate::store::ObjectStore;
    use crate::test_utils::*;
    use crds::ProvisioningState;

    fn setup(hosts: &[(&str, &str)]) -> (TestStores, Metal3Adaptor, HardwareManager) {
        let stores = TestStores::new();
        for (name, pool) in hosts {
            stores
                .bare_metal_hosts
                .insert(bare_metal_host(name, pool, ProvisioningState::Available));
        }
        stores.hardware_profiles.insert(hardware_profile("profile-a"));
        stores.hardware_profiles.insert(hardware_profile("profile-b"));
        let adaptor = Metal3Adaptor::new(stores.context());
        (stores, adaptor, hardware_manager(AdaptorId::Metal3))
    }

    fn set_host_state(stores: &TestStores, name: &str, state: ProvisioningState) {
        let mut bmh = stores.bare_metal_hosts.fetch(BMH_NAMESPACE, name).expect("host");
        if let Some(status) = bmh.status.as_mut() {
            status.provisioning.state = state;
        }
        stores.bare_metal_hosts.insert(bmh);
    }

    #[tokio::test]
    async fn test_create_claims_hosts_then_processing_completes() {
        let (stores, adaptor, hwmgr) = setup(&[("host-a", "pool-a"), ("host-b", "pool-a"), ("host-c", "pool-a")]);
        let np = stores
            .nodepools
            .insert(nodepool("np-1", &[("worker", "pool-a", "profile-a", 2)]));

        let action = adaptor
            .handle_nodepool_create(&hwmgr, &np)
            .await
            .expect("hosts claimed");
        assert_eq!(action, requeue_with_short_interval());

        let nodes = stores.nodes.objects();
        assert_eq!(nodes.len(), 2);
        let mut ids: Vec<&str> = nodes.iter().map(|n| n.spec.hw_mgr_node_id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["host-a", "host-b"]);
        assert!(nodes.iter().all(|n| n.spec.hw_mgr_node_ns == BMH_NAMESPACE));
        assert!(nodes
            .iter()
            .all(|n| n.status.as_ref().and_then(|s| s.bmc.as_ref()).is_some()));

        let stored = stores.nodepool("np-1");
        assert_eq!(determine_action(&stored), NodePoolAction::Processing);

        // Hosts still provisioning keep the pool in progress
        set_host_state(&stores, "host-a", ProvisioningState::Provisioning);
        let action = adaptor
            .handle_nodepool_processing(&hwmgr, &stored)
            .await
            .expect("progress checked");
        assert_eq!(action, requeue_with_short_interval());
        assert!(!is_provisioned_completed(&stores.nodepool("np-1")));

        set_host_state(&stores, "host-a", ProvisioningState::Provisioned);
        let stored = stores.nodepool("np-1");
        adaptor
            .handle_nodepool_processing(&hwmgr, &stored)
            .await
            .expect("progress checked");
        let stored = stores.nodepool("np-1");
        assert!(is_provisioned_completed(&stored));
        assert_eq!(stored.observed_generation(), 1);
        assert!(stores.nodes.objects().iter().all(is_node_provisioned));
    }

    #[tokio::test]
    async fn test_missing_profile_is_permanent() {
        let (stores, adaptor, hwmgr) = setup(&[("host-a", "pool-a")]);
        let np = stores
            .nodepools
            .insert(nodepool("np-1", &[("worker", "pool-a", "missing-profile", 1)]));

        let err = adaptor
            .handle_nodepool_create(&hwmgr, &np)
            .await
            .expect_err("profile missing");
        assert!(err.is_permanent());
        assert!(stores.nodes.objects().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_hosts_claims_nothing() {
        let (stores, adaptor, hwmgr) = setup(&[("host-a", "pool-a"), ("host-b", "pool-b")]);
        let np = stores.nodepools.insert(nodepool(
            "np-1",
            &[("controller", "pool-b", "profile-a", 1), ("worker", "pool-a", "profile-a", 2)],
        ));

        let err = adaptor
            .handle_nodepool_create(&hwmgr, &np)
            .await
            .expect_err("pool-a too small");
        assert!(matches!(err, AdaptorError::InsufficientResources(_)));
        assert!(stores
            .bare_metal_hosts
            .objects()
            .iter()
            .all(|b| !node::is_allocated(b)));
    }

    #[tokio::test]
    async fn test_vanished_host_fails_node() {
        let (stores, adaptor, hwmgr) = setup(&[("host-a", "pool-a")]);
        let np = stores
            .nodepools
            .insert(nodepool("np-1", &[("worker", "pool-a", "profile-a", 1)]));
        adaptor
            .handle_nodepool_create(&hwmgr, &np)
            .await
            .expect("host claimed");

        stores
            .bare_metal_hosts
            .delete(BMH_NAMESPACE, "host-a")
            .await
            .expect("host removed");
        let err = adaptor
            .progress_nodepool(&stores.nodepool("np-1"), "Created")
            .await
            .expect_err("host gone");
        assert!(matches!(err, AdaptorError::AllocationFailed(_)));

        let node = stores.nodes.objects().remove(0);
        let cond = find_status_condition(node.conditions(), ConditionType::Provisioned).expect("condition");
        assert_eq!(cond.reason, ConditionReason::Failed.as_str());
        assert!(!is_provisioned_failed(&stores.nodepool("np-1")));
    }

    #[tokio::test]
    async fn test_vanished_host_does_not_regress_completed_node() {
        let (stores, adaptor, hwmgr) = setup(&[("host-a", "pool-a")]);
        let np = stores
            .nodepools
            .insert(nodepool("np-1", &[("worker", "pool-a", "profile-a", 1)]));
        adaptor.handle_nodepool_create(&hwmgr, &np).await.expect("host claimed");
        adaptor
            .handle_nodepool_processing(&hwmgr, &stores.nodepool("np-1"))
            .await
            .expect("completed");
        assert!(is_node_provisioned(&stores.nodes.objects().remove(0)));

        stores
            .bare_metal_hosts
            .delete(BMH_NAMESPACE, "host-a")
            .await
            .expect("host removed");
        let err = adaptor
            .progress_nodepool(&stores.nodepool("np-1"), "Completed")
            .await
            .expect_err("host gone");
        assert!(matches!(err, AdaptorError::AllocationFailed(_)));

        let node = stores.nodes.objects().remove(0);
        let cond = find_status_condition(node.conditions(), ConditionType::Provisioned).expect("condition");
        assert_eq!(cond.reason, ConditionReason::Completed.as_str());
        assert!(is_node_provisioned(&node));
    }

    #[tokio::test]
    async fn test_spec_change_applies_profile_when_host_ready() {
        let (stores, adaptor, hwmgr) = setup(&[("host-a", "pool-a")]);
        let np = stores
            .nodepools
            .insert(nodepool("np-1", &[("worker", "pool-a", "profile-a", 1)]));
        adaptor.handle_nodepool_create(&hwmgr, &np).await.expect("claimed");
        adaptor
            .handle_nodepool_processing(&hwmgr, &stores.nodepool("np-1"))
            .await
            .expect("completed");

        let mut changed = stores.nodepool("np-1");
        changed.spec.node_group[0].node_pool_data.hw_profile = "profile-b".to_string();
        let changed = stores
            .nodepools
            .replace(TEST_NAMESPACE, &changed)
            .await
            .expect("spec update");
        assert_eq!(determine_action(&changed), NodePoolAction::SpecChanged);

        set_host_state(&stores, "host-a", ProvisioningState::Provisioning);
        adaptor
            .handle_nodepool_spec_changed(&hwmgr, &changed)
            .await
            .expect("update requested");
        let node = stores.nodes.objects().remove(0);
        let configured = find_status_condition(node.conditions(), ConditionType::Configured).expect("configured");
        assert_eq!(configured.reason, ConditionReason::ConfigUpdate.as_str());
        let stored = stores.nodepool("np-1");
        assert_eq!(stored.observed_generation(), 1);
        assert_eq!(determine_action(&stored), NodePoolAction::Processing);

        set_host_state(&stores, "host-a", ProvisioningState::Provisioned);
        adaptor
            .handle_nodepool_processing(&hwmgr, &stored)
            .await
            .expect("profile applied");
        let node = stores.nodes.objects().remove(0);
        assert_eq!(node.status.as_ref().expect("status").hw_profile, "profile-b");
        let stored = stores.nodepool("np-1");
        assert_eq!(stored.observed_generation(), 2);
        assert_eq!(determine_action(&stored), NodePoolAction::Noop);
    }

    #[tokio::test]
    async fn test_release_frees_host_for_reuse() {
        let (stores, adaptor, hwmgr) = setup(&[("host-a", "pool-a")]);
        let np = stores
            .nodepools
            .insert(nodepool("np-1", &[("worker", "pool-a", "profile-a", 1)]));
        adaptor.handle_nodepool_create(&hwmgr, &np).await.expect("claimed");

        let node = stores.nodes.objects().remove(0);
        adaptor.release_node(&hwmgr, &np, &node).await.expect("released");
        adaptor.release_node(&hwmgr, &np, &node).await.expect("released twice");
        assert!(!node::is_allocated(
            &stores.bare_metal_hosts.fetch(BMH_NAMESPACE, "host-a").expect("host")
        ));
    }

    #[tokio::test]
    async fn test_inventory_reports_bound_profile() {
        let (stores, adaptor, hwmgr) = setup(&[("host-a", "pool-a"), ("host-b", "pool-b")]);
        let np = stores
            .nodepools
            .insert(nodepool("np-1", &[("worker", "pool-a", "profile-a", 1)]));
        adaptor.handle_nodepool_create(&hwmgr, &np).await.expect("claimed");
        adaptor
            .handle_nodepool_processing(&hwmgr, &stores.nodepool("np-1"))
            .await
            .expect("completed");

        let pools = adaptor.get_resource_pools(&hwmgr).await.expect("pools");
        assert_eq!(pools.len(), 2);

        let resources = adaptor.get_resources(&hwmgr).await.expect("resources");
        let host_a = resources.iter().find(|r| r.name == "host-a").expect("host-a");
        assert_eq!(host_a.hw_profile, "profile-a");
        let host_b = resources.iter().find(|r| r.name == "host-b").expect("host-b");
        assert_eq!(host_b.hw_profile, "");
    }
}
