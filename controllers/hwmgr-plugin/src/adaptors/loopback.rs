//! Loopback adaptor.
//!
//! Simulates a hardware manager with a ConfigMap in the plugin namespace.
//! The `resources` key lists resource pools and free nodes; the adaptor keeps
//! its allocations under the `allocations` key of the same ConfigMap, so every
//! allocation is a read-modify-write of that object. Allocation completes
//! synchronously: a NodePool goes from Create straight to Completed.

use super::{
    bmc_secret_name, create_bmc_secret, delete_bmc_secret, Adaptor, AdaptorContext, AdaptorError,
};
use crate::conditions::set_status_condition;
use crate::fsm::do_not_requeue;
use crate::inventory::{InventoryError, ResourceInfo, ResourcePoolInfo};
use crate::nodepool::{
    complete_nodepool_transition, create_node, is_node_provisioned, list_nodes_for_nodepool, namespace_of,
    update_node_status, update_nodepool_selected_pools, update_nodepool_status_condition,
};
use crate::retry::{retry_on_conflict_or_retriable, RetryClassify};
use base64::Engine;
use crds::{
    AdaptorId, Bmc, ConditionReason, ConditionStatus, ConditionType, HardwareManager, Interface, Node, NodeGroup,
    NodePool, NodeSpec, CONFIG_SUCCESS_MESSAGE,
};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// ConfigMap holding the simulated inventory and its allocations
pub const INVENTORY_CONFIGMAP: &str = "loopback-adaptor-nodelist";

const RESOURCES_KEY: &str = "resources";
const ALLOCATIONS_KEY: &str = "allocations";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Inventory {
    #[serde(default)]
    resourcepools: Vec<String>,
    #[serde(default)]
    nodes: BTreeMap<String, InventoryNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InventoryNode {
    #[serde(rename = "poolID")]
    resource_pool_id: String,
    bmc: InventoryBmc,
    #[serde(default)]
    interfaces: Vec<Interface>,
    #[serde(default)]
    hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InventoryBmc {
    address: String,
    #[serde(rename = "username-base64")]
    username_base64: String,
    #[serde(rename = "password-base64")]
    password_base64: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Allocations {
    #[serde(default)]
    clouds: Vec<CloudAllocation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CloudAllocation {
    #[serde(rename = "cloudID")]
    cloud_id: String,
    #[serde(default)]
    nodegroups: BTreeMap<String, Vec<String>>,
}

impl Allocations {
    fn allocated(&self) -> BTreeSet<String> {
        self.clouds
            .iter()
            .flat_map(|cloud| cloud.nodegroups.values().flatten())
            .cloned()
            .collect()
    }

    fn group_nodes(&self, cloud_id: &str, group: &str) -> Vec<String> {
        self.clouds
            .iter()
            .find(|cloud| cloud.cloud_id == cloud_id)
            .and_then(|cloud| cloud.nodegroups.get(group))
            .cloned()
            .unwrap_or_default()
    }

    fn assign(&mut self, cloud_id: &str, group: &str, node: &str) {
        let index = match self.clouds.iter().position(|cloud| cloud.cloud_id == cloud_id) {
            Some(index) => index,
            None => {
                self.clouds.push(CloudAllocation {
                    cloud_id: cloud_id.to_string(),
                    nodegroups: BTreeMap::new(),
                });
                self.clouds.len() - 1
            }
        };
        self.clouds[index]
            .nodegroups
            .entry(group.to_string())
            .or_default()
            .push(node.to_string());
    }

    /// Drops a node from every group; returns whether it was allocated.
    fn release(&mut self, node: &str) -> bool {
        let mut released = false;
        for cloud in &mut self.clouds {
            for nodes in cloud.nodegroups.values_mut() {
                let before = nodes.len();
                nodes.retain(|n| n != node);
                released |= nodes.len() != before;
            }
            cloud.nodegroups.retain(|_, nodes| !nodes.is_empty());
        }
        self.clouds.retain(|cloud| !cloud.nodegroups.is_empty());
        released
    }
}

fn parse_configmap(cm: &ConfigMap) -> Result<(Inventory, Allocations), AdaptorError> {
    let data = cm.data.as_ref();
    let resources = data
        .and_then(|d| d.get(RESOURCES_KEY))
        .ok_or_else(|| AdaptorError::InvalidConfig(format!("{} has no {} key", INVENTORY_CONFIGMAP, RESOURCES_KEY)))?;
    let inventory: Inventory = serde_yaml::from_str(resources)
        .map_err(|e| AdaptorError::InvalidConfig(format!("unable to parse {}: {}", RESOURCES_KEY, e)))?;

    let allocations = match data.and_then(|d| d.get(ALLOCATIONS_KEY)) {
        Some(raw) if !raw.trim().is_empty() => serde_yaml::from_str(raw)
            .map_err(|e| AdaptorError::InvalidConfig(format!("unable to parse {}: {}", ALLOCATIONS_KEY, e)))?,
        _ => Allocations::default(),
    };

    Ok((inventory, allocations))
}

fn store_allocations(cm: &mut ConfigMap, allocations: &Allocations) -> Result<(), AdaptorError> {
    let raw = serde_yaml::to_string(allocations)
        .map_err(|e| AdaptorError::InvalidConfig(format!("unable to encode {}: {}", ALLOCATIONS_KEY, e)))?;
    cm.data
        .get_or_insert_with(BTreeMap::new)
        .insert(ALLOCATIONS_KEY.to_string(), raw);
    Ok(())
}

fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>, AdaptorError> {
    base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|e| AdaptorError::InvalidResource(format!("invalid base64 in {}: {}", field, e)))
}

pub struct LoopbackAdaptor {
    ctx: AdaptorContext,
}

impl LoopbackAdaptor {
    pub fn new(ctx: AdaptorContext) -> Self {
        Self { ctx }
    }

    async fn current_resources(&self) -> Result<(Inventory, Allocations), AdaptorError> {
        let cm = self
            .ctx
            .stores
            .config_maps
            .get(&self.ctx.namespace, INVENTORY_CONFIGMAP)
            .await?;
        parse_configmap(&cm)
    }

    /// Fails up front when a pool cannot cover every group drawing from it,
    /// so a short pool never leaves a partial allocation behind.
    fn check_capacity(
        nodepool: &NodePool,
        inventory: &Inventory,
        allocations: &Allocations,
    ) -> Result<(), AdaptorError> {
        let allocated = allocations.allocated();
        let mut needed: BTreeMap<&str, usize> = BTreeMap::new();
        for group in &nodepool.spec.node_group {
            let have = allocations
                .group_nodes(&nodepool.spec.cloud_id, &group.node_pool_data.name)
                .len();
            let want = group.size as usize;
            *needed.entry(group.node_pool_data.resource_pool_id.as_str()).or_default() +=
                want.saturating_sub(have);
        }

        for (pool, count) in needed {
            let free = inventory
                .nodes
                .iter()
                .filter(|(name, node)| node.resource_pool_id == pool && !allocated.contains(name.as_str()))
                .count();
            if free < count {
                return Err(AdaptorError::InsufficientResources(format!(
                    "resource pool {} has {} free nodes, {} requested",
                    pool, free, count
                )));
            }
        }
        Ok(())
    }

    /// Claims one free node of the group's pool in the allocations ConfigMap.
    async fn allocate_node(&self, nodepool: &NodePool, group: &NodeGroup) -> Result<(String, InventoryNode), AdaptorError> {
        let store = self.ctx.stores.config_maps.as_ref();
        let namespace = self.ctx.namespace.as_str();
        let cloud_id = nodepool.spec.cloud_id.as_str();
        let group_name = group.node_pool_data.name.as_str();
        let pool = group.node_pool_data.resource_pool_id.as_str();

        retry_on_conflict_or_retriable(&self.ctx.retry, || async move {
            let mut cm = store.get(namespace, INVENTORY_CONFIGMAP).await?;
            let (inventory, mut allocations) = parse_configmap(&cm)?;
            let allocated = allocations.allocated();

            let (name, node) = inventory
                .nodes
                .into_iter()
                .find(|(name, node)| node.resource_pool_id == pool && !allocated.contains(name))
                .ok_or_else(|| {
                    AdaptorError::InsufficientResources(format!("no free node left in resource pool {}", pool))
                })?;

            allocations.assign(cloud_id, group_name, &name);
            store_allocations(&mut cm, &allocations)?;
            store.replace(namespace, &cm).await?;
            info!("[loopback] Allocated node {} from pool {} to {}/{}", name, pool, cloud_id, group_name);
            Ok::<_, AdaptorError>((name, node))
        })
        .await
    }

    /// Creates the Node object, its BMC secret and its status for an
    /// allocated inventory node. Already provisioned Nodes are left alone.
    async fn ensure_node(
        &self,
        hwmgr: &HardwareManager,
        nodepool: &NodePool,
        group: &NodeGroup,
        name: &str,
        info: &InventoryNode,
    ) -> Result<(), AdaptorError> {
        let spec = NodeSpec {
            node_pool: nodepool.name_any(),
            group_name: group.node_pool_data.name.clone(),
            hw_profile: group.node_pool_data.hw_profile.clone(),
            hw_mgr_id: hwmgr.name_any(),
            hw_mgr_node_id: name.to_string(),
            hw_mgr_node_ns: String::new(),
        };
        let node = create_node(self.ctx.stores.nodes.as_ref(), nodepool, name, spec).await?;
        if is_node_provisioned(&node) {
            return Ok(());
        }

        let mut credentials = BTreeMap::new();
        credentials.insert(
            "username".to_string(),
            decode_base64("username-base64", &info.bmc.username_base64)?,
        );
        credentials.insert(
            "password".to_string(),
            decode_base64("password-base64", &info.bmc.password_base64)?,
        );
        let secret = create_bmc_secret(self.ctx.stores.secrets.as_ref(), nodepool, name, credentials).await?;

        let namespace = namespace_of(nodepool)?;
        let profile = group.node_pool_data.hw_profile.as_str();
        update_node_status(self.ctx.stores.nodes.as_ref(), &self.ctx.retry, &namespace, name, |status| {
            status.bmc = Some(Bmc {
                address: info.bmc.address.clone(),
                credentials_name: secret.clone(),
            });
            status.interfaces.clone_from(&info.interfaces);
            status.hostname.clone_from(&info.hostname);
            status.hw_profile = profile.to_string();
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
        Ok(())
    }

    /// Brings every group up to its requested size.
    async fn allocate_nodepool(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<(), AdaptorError> {
        let (inventory, allocations) = self.current_resources().await?;
        Self::check_capacity(nodepool, &inventory, &allocations)?;

        let mut selected_pools = BTreeMap::new();
        for group in &nodepool.spec.node_group {
            let group_name = &group.node_pool_data.name;
            selected_pools.insert(group_name.clone(), group.node_pool_data.resource_pool_id.clone());

            let existing = allocations.group_nodes(&nodepool.spec.cloud_id, group_name);
            for name in &existing {
                let info = inventory.nodes.get(name).ok_or_else(|| {
                    AdaptorError::InvalidConfig(format!("allocated node {} is missing from the inventory", name))
                })?;
                self.ensure_node(hwmgr, nodepool, group, name, info).await?;
            }

            for _ in existing.len()..group.size as usize {
                let (name, info) = self.allocate_node(nodepool, group).await?;
                self.ensure_node(hwmgr, nodepool, group, &name, &info).await?;
            }
        }

        update_nodepool_selected_pools(
            self.ctx.stores.nodepools.as_ref(),
            &self.ctx.retry,
            nodepool,
            &selected_pools,
        )
        .await?;
        Ok(())
    }

    /// Re-points Nodes at their group's current hardware profile.
    async fn apply_profile_changes(&self, nodepool: &NodePool) -> Result<(), AdaptorError> {
        let store = self.ctx.stores.nodes.as_ref();
        let namespace = namespace_of(nodepool)?;
        let nodes = list_nodes_for_nodepool(store, nodepool).await?;

        for node in nodes {
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
            info!("[loopback] Updating node {} to hardware profile {}", name, profile);
            let (namespace_ref, name_ref) = (namespace.as_str(), name.as_str());
            retry_on_conflict_or_retriable(&self.ctx.retry, || async move {
                let mut fresh = store.get(namespace_ref, name_ref).await?;
                fresh.spec.hw_profile = profile.to_string();
                store.replace(namespace_ref, &fresh).await
            })
            .await?;

            update_node_status(store, &self.ctx.retry, &namespace, &name, |status| {
                status.hw_profile = profile.to_string();
                set_status_condition(
                    &mut status.conditions,
                    ConditionType::Configured,
                    ConditionReason::ConfigApplied,
                    ConditionStatus::True,
                    CONFIG_SUCCESS_MESSAGE,
                );
            })
            .await?;
        }
        Ok(())
    }

    async fn complete(&self, nodepool: &NodePool, message: &str) -> Result<Action, AdaptorError> {
        let store = self.ctx.stores.nodepools.as_ref();
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
}

#[async_trait::async_trait]
impl Adaptor for LoopbackAdaptor {
    fn adaptor_id(&self) -> AdaptorId {
        AdaptorId::Loopback
    }

    fn context(&self) -> &AdaptorContext {
        &self.ctx
    }

    async fn get_resource_pools(&self, _hwmgr: &HardwareManager) -> Result<Vec<ResourcePoolInfo>, InventoryError> {
        let (inventory, _) = self
            .current_resources()
            .await
            .map_err(|e| InventoryError::Unavailable(format!("unable to get current resources: {}", e)))?;

        Ok(inventory
            .resourcepools
            .into_iter()
            .map(|pool| ResourcePoolInfo {
                resource_pool_id: pool.clone(),
                name: pool.clone(),
                description: pool,
                site_id: Some("n/a".to_string()),
            })
            .collect())
    }

    async fn get_resources(&self, _hwmgr: &HardwareManager) -> Result<Vec<ResourceInfo>, InventoryError> {
        let (inventory, _) = self
            .current_resources()
            .await
            .map_err(|e| InventoryError::Unavailable(format!("unable to get current resources: {}", e)))?;

        Ok(inventory
            .nodes
            .into_iter()
            .map(|(name, node)| ResourceInfo {
                resource_id: name.clone(),
                resource_pool_id: node.resource_pool_id,
                name,
                description: "n/a".to_string(),
                ..Default::default()
            })
            .collect())
    }

    async fn handle_nodepool_create(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<Action, AdaptorError> {
        info!("[loopback] Allocating nodes for nodepool {}", nodepool.name_any());
        self.allocate_nodepool(hwmgr, nodepool).await?;
        self.complete(nodepool, "Created").await
    }

    async fn handle_nodepool_processing(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<Action, AdaptorError> {
        debug!("[loopback] Resuming allocation for nodepool {}", nodepool.name_any());
        self.allocate_nodepool(hwmgr, nodepool).await?;
        self.complete(nodepool, "Created").await
    }

    async fn handle_nodepool_spec_changed(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<Action, AdaptorError> {
        info!("[loopback] Applying spec change to nodepool {}", nodepool.name_any());
        self.allocate_nodepool(hwmgr, nodepool).await?;
        self.apply_profile_changes(nodepool).await?;
        self.complete(nodepool, "Updated").await
    }

    async fn release_node(&self, _hwmgr: &HardwareManager, _nodepool: &NodePool, node: &Node) -> Result<(), AdaptorError> {
        let store = self.ctx.stores.config_maps.as_ref();
        let namespace = self.ctx.namespace.as_str();
        let name = node.name_any();
        let name_ref = name.as_str();

        let result: Result<(), AdaptorError> = retry_on_conflict_or_retriable(&self.ctx.retry, || async move {
            let mut cm = store.get(namespace, INVENTORY_CONFIGMAP).await?;
            let (_, mut allocations) = parse_configmap(&cm)?;
            if !allocations.release(name_ref) {
                return Ok(());
            }
            store_allocations(&mut cm, &allocations)?;
            store.replace(namespace, &cm).await?;
            info!("[loopback] Released node {}", name_ref);
            Ok(())
        })
        .await;

        if let Err(e) = result {
            if !e.is_not_found() {
                return Err(e);
            }
        }

        let secret = node
            .status
            .as_ref()
            .and_then(|s| s.bmc.as_ref())
            .map(|bmc| bmc.credentials_name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| bmc_secret_name(&name));
        delete_bmc_secret(self.ctx.stores.secrets.as_ref(), &node.namespace().unwrap_or_default(), &secret).await?;
        Ok(())
    }
}
