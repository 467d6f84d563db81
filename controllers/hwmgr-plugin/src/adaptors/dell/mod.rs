//! Dell hardware manager adaptor.
//!
//! Allocation is delegated to a remote hardware manager: Create submits a
//! resource group job for the whole NodePool and records its id in the
//! pool's properties, Processing polls the job and creates the Nodes once
//! the hardware manager reports the group allocated.

pub mod node;

use super::{bmc_secret_name, create_bmc_secret, delete_bmc_secret, Adaptor, AdaptorContext, AdaptorError};
use crate::conditions::set_status_condition;
use crate::fsm::{do_not_requeue, requeue_with_medium_interval, requeue_with_short_interval};
use crate::inventory::{InventoryError, ResourceInfo, ResourcePoolInfo};
use crate::nodepool::{
    complete_nodepool_transition, create_node, get_resource_type_id, is_node_provisioned, is_provisioned_failed,
    list_nodes_for_nodepool, namespace_of, update_node_status,
    update_nodepool_properties, update_nodepool_selected_pools, update_nodepool_status_condition,
    RESOURCE_TYPE_ID_KEY,
};
use crate::store::ObjectStore;
use crds::{
    AdaptorId, ConditionReason, ConditionStatus, ConditionType, HardwareManager, Node, NodeGroup, NodePool, NodeSpec,
    CONFIG_SUCCESS_MESSAGE,
};
use hwmgr_client::{HwMgrClient, HwMgrClientTrait, JobState, Resource, ResourceGroupRequest, ResourceSelector};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// NodePool property holding the hardware manager's resource group id
pub const RESOURCE_GROUP_ID_PROPERTY: &str = "resourceGroupId";

/// Secret key holding the hardware manager API token
pub const TOKEN_SECRET_KEY: &str = "token";

pub const DEFAULT_TENANT: &str = "default_tenant";

/// Builds API clients for a HardwareManager.
#[async_trait::async_trait]
pub trait ClientFactory: Send + Sync {
    async fn client(&self, hwmgr: &HardwareManager) -> Result<Arc<dyn HwMgrClientTrait>, AdaptorError>;
}

/// Creates HTTP clients from the HardwareManager's connection data. The
/// token is read from the referenced Secret in the plugin namespace, falling
/// back to a token supplied through configuration.
pub struct HwMgrClientFactory {
    secrets: Arc<dyn ObjectStore<Secret>>,
    namespace: String,
    fallback_token: Option<String>,
}

impl HwMgrClientFactory {
    pub fn new(secrets: Arc<dyn ObjectStore<Secret>>, namespace: String, fallback_token: Option<String>) -> Self {
        Self {
            secrets,
            namespace,
            fallback_token,
        }
    }

    async fn token(&self, auth_secret: &str) -> Result<String, AdaptorError> {
        if auth_secret.is_empty() {
            return self
                .fallback_token
                .clone()
                .ok_or_else(|| AdaptorError::InvalidConfig("no auth secret or token configured".to_string()));
        }

        let secret = self.secrets.get(&self.namespace, auth_secret).await?;
        let token = secret
            .data
            .as_ref()
            .and_then(|data| data.get(TOKEN_SECRET_KEY))
            .ok_or_else(|| {
                AdaptorError::InvalidConfig(format!("secret {} has no {} key", auth_secret, TOKEN_SECRET_KEY))
            })?;
        String::from_utf8(token.0.clone())
            .map(|t| t.trim().to_string())
            .map_err(|_| AdaptorError::InvalidConfig(format!("secret {} holds a non-UTF-8 token", auth_secret)))
    }
}

#[async_trait::async_trait]
impl ClientFactory for HwMgrClientFactory {
    async fn client(&self, hwmgr: &HardwareManager) -> Result<Arc<dyn HwMgrClientTrait>, AdaptorError> {
        let data = hwmgr.spec.dell_data.as_ref().ok_or_else(|| {
            AdaptorError::InvalidConfig(format!("hardware manager {} has no dellData", hwmgr.name_any()))
        })?;
        let token = self.token(&data.auth_secret).await?;
        let tenant = data.tenant.clone().unwrap_or_else(|| DEFAULT_TENANT.to_string());
        Ok(Arc::new(HwMgrClient::new(data.api_url.clone(), token, tenant)?))
    }
}

/// Maps a backend failure onto the inventory status contract.
fn inventory_error(err: AdaptorError) -> InventoryError {
    if err.is_transient() {
        InventoryError::Unavailable(err.to_string())
    } else {
        InventoryError::Internal(err.to_string())
    }
}

fn resource_group_id(nodepool: &NodePool) -> Option<&str> {
    nodepool
        .status
        .as_ref()
        .and_then(|s| s.properties.get(RESOURCE_GROUP_ID_PROPERTY))
        .map(String::as_str)
        .filter(|id| !id.is_empty())
}

pub struct DellAdaptor {
    ctx: AdaptorContext,
    clients: Arc<dyn ClientFactory>,
}

impl DellAdaptor {
    pub fn new(ctx: AdaptorContext, clients: Arc<dyn ClientFactory>) -> Self {
        Self { ctx, clients }
    }

    fn resource_group_request(nodepool: &NodePool, resource_type_id: &str) -> ResourceGroupRequest {
        let resource_selectors = nodepool
            .spec
            .node_group
            .iter()
            .map(|group| {
                let data = &group.node_pool_data;
                (
                    data.name.clone(),
                    ResourceSelector {
                        resource_pool_id: data.resource_pool_id.clone(),
                        resource_profile_id: data.hw_profile.clone(),
                        num_resources: group.size,
                        role: data.role.clone(),
                    },
                )
            })
            .collect();

        ResourceGroupRequest {
            name: nodepool.name_any(),
            description: format!("NodePool {} for cloud {}", nodepool.name_any(), nodepool.spec.cloud_id),
            resource_type_id: resource_type_id.to_string(),
            resource_selectors,
        }
    }

    /// Matches allocated resources to node groups by resource pool, filling
    /// groups in order.
    fn assign_groups<'a>(nodepool: &'a NodePool, resources: &[Resource]) -> Result<Vec<&'a NodeGroup>, AdaptorError> {
        let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
        let mut assigned = Vec::with_capacity(resources.len());

        for resource in resources {
            let candidates = || {
                nodepool
                    .spec
                    .node_group
                    .iter()
                    .filter(|g| g.node_pool_data.resource_pool_id == resource.resource_pool_id)
            };
            let group = candidates()
                .find(|g| counts.get(g.node_pool_data.name.as_str()).copied().unwrap_or_default() < g.size)
                .or_else(|| candidates().next())
                .ok_or_else(|| {
                    AdaptorError::InvalidResource(format!(
                        "resource {} belongs to unrequested pool {}",
                        resource.id, resource.resource_pool_id
                    ))
                })?;
            *counts.entry(group.node_pool_data.name.as_str()).or_default() += 1;
            assigned.push(group);
        }
        Ok(assigned)
    }

    /// Creates the Node and BMC secret for one allocated resource.
    async fn allocate_node(
        &self,
        hwmgr: &HardwareManager,
        nodepool: &NodePool,
        group: &NodeGroup,
        resource: &Resource,
    ) -> Result<(), AdaptorError> {
        let name = resource.id.as_str();
        let hw_profile = if resource.resource_profile_id.is_empty() {
            group.node_pool_data.hw_profile.clone()
        } else {
            resource.resource_profile_id.clone()
        };

        let spec = NodeSpec {
            node_pool: nodepool.name_any(),
            group_name: group.node_pool_data.name.clone(),
            hw_profile: hw_profile.clone(),
            hw_mgr_id: hwmgr.name_any(),
            hw_mgr_node_id: resource.id.clone(),
            hw_mgr_node_ns: String::new(),
        };
        let node = create_node(self.ctx.stores.nodes.as_ref(), nodepool, name, spec).await?;
        if is_node_provisioned(&node) {
            return Ok(());
        }

        let mut credentials = BTreeMap::new();
        credentials.insert("password".to_string(), node::bmc_password(resource)?.as_bytes().to_vec());
        let secret = create_bmc_secret(self.ctx.stores.secrets.as_ref(), nodepool, name, credentials).await?;

        let bmc = node::node_bmc(resource, &secret)?;
        let interfaces = node::node_interfaces(resource)?;
        let namespace = namespace_of(nodepool)?;
        update_node_status(self.ctx.stores.nodes.as_ref(), &self.ctx.retry, &namespace, name, |status| {
            status.bmc = Some(bmc.clone());
            status.interfaces.clone_from(&interfaces);
            status.hostname.clone_from(&resource.name);
            status.hw_profile.clone_from(&hw_profile);
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
        info!("[dell-hwmgr] Allocated node {} for nodepool {}", name, nodepool.name_any());
        Ok(())
    }

    /// Builds Nodes from a completed resource group and completes the pool.
    async fn complete_allocation(
        &self,
        hwmgr: &HardwareManager,
        nodepool: &NodePool,
        resources: &[Resource],
    ) -> Result<Action, AdaptorError> {
        for resource in resources {
            node::validate_resource(resource)?;
        }
        let groups = Self::assign_groups(nodepool, resources)?;

        let mut selected_pools = BTreeMap::new();
        for (resource, group) in resources.iter().zip(groups) {
            selected_pools.insert(group.node_pool_data.name.clone(), resource.resource_pool_id.clone());
            self.allocate_node(hwmgr, nodepool, group, resource)
                .await
                .map_err(|e| e.context(format!("failed to allocate node {}", resource.id)))?;
        }

        let store = self.ctx.stores.nodepools.as_ref();
        update_nodepool_selected_pools(store, &self.ctx.retry, nodepool, &selected_pools).await?;
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
            "Created",
        )
        .await?;
        Ok(do_not_requeue())
    }

    /// Deletes the pool's resource group. A group already gone is released.
    async fn release_resource_group(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<(), AdaptorError> {
        let Some(id) = resource_group_id(nodepool) else {
            return Ok(());
        };
        let client = self.clients.client(hwmgr).await?;
        match client.delete_resource_group(id).await {
            Ok(()) => {
                info!("[dell-hwmgr] Deleted resource group {}", id);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("[dell-hwmgr] Resource group {} already deleted", id);
                Ok(())
            }
            Err(e) => Err(AdaptorError::from(e).context(format!("failed to delete resource group {}", id))),
        }
    }

    /// Releases every Node of the pool.
    async fn release_nodes(&self, hwmgr: &HardwareManager, nodepool: &NodePool, delete: bool) -> Result<(), AdaptorError> {
        let store = self.ctx.stores.nodes.as_ref();
        for node in list_nodes_for_nodepool(store, nodepool).await? {
            self.release_node(hwmgr, nodepool, &node).await?;
            if delete {
                match store.delete(&node.namespace().unwrap_or_default(), &node.name_any()).await {
                    Err(e) if !e.is_not_found() => return Err(e.into()),
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Adaptor for DellAdaptor {
    fn adaptor_id(&self) -> AdaptorId {
        AdaptorId::DellHwMgr
    }

    fn context(&self) -> &AdaptorContext {
        &self.ctx
    }

    async fn validate_hardware_manager(&self, hwmgr: &HardwareManager) -> Result<(), AdaptorError> {
        let client = self.clients.client(hwmgr).await?;
        client.validate_token().await?;
        Ok(())
    }

    async fn get_resource_pools(&self, hwmgr: &HardwareManager) -> Result<Vec<ResourcePoolInfo>, InventoryError> {
        let client = self.clients.client(hwmgr).await.map_err(inventory_error)?;
        let pools = client
            .get_resource_pools()
            .await
            .map_err(|e| inventory_error(e.into()))?;

        Ok(pools
            .into_iter()
            .map(|pool| ResourcePoolInfo {
                resource_pool_id: pool.id,
                name: pool.name,
                description: pool.description,
                site_id: pool.site_id,
            })
            .collect())
    }

    async fn get_resources(&self, hwmgr: &HardwareManager) -> Result<Vec<ResourceInfo>, InventoryError> {
        let client = self.clients.client(hwmgr).await.map_err(inventory_error)?;
        let resources = client
            .get_resources()
            .await
            .map_err(|e| inventory_error(e.into()))?;

        Ok(resources
            .into_iter()
            .map(|r| ResourceInfo {
                resource_id: r.id,
                resource_pool_id: r.resource_pool_id,
                name: r.name,
                description: r.description,
                hw_profile: r.resource_profile_id,
                memory: r.memory_mib,
                model: r.model,
                vendor: r.vendor,
                serial_number: r.serial_number,
                ..Default::default()
            })
            .collect())
    }

    async fn handle_nodepool_create(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<Action, AdaptorError> {
        let resource_type_id = get_resource_type_id(nodepool).ok_or_else(|| {
            AdaptorError::InvalidConfig(format!(
                "nodepool {} is missing the {} extension",
                nodepool.name_any(),
                RESOURCE_TYPE_ID_KEY
            ))
        })?;

        let client = self.clients.client(hwmgr).await?;
        let request = Self::resource_group_request(nodepool, resource_type_id);
        let group = client
            .create_resource_group(&request)
            .await
            .map_err(|e| AdaptorError::from(e).context(format!("failed to create resource group for {}", request.name)))?;
        info!(
            "[dell-hwmgr] Requested resource group {} for nodepool {}",
            group.id,
            nodepool.name_any()
        );

        let store = self.ctx.stores.nodepools.as_ref();
        let mut properties = BTreeMap::new();
        properties.insert(RESOURCE_GROUP_ID_PROPERTY.to_string(), group.id.clone());
        update_nodepool_properties(store, &self.ctx.retry, nodepool, &properties).await?;
        update_nodepool_status_condition(
            store,
            &self.ctx.retry,
            nodepool,
            ConditionType::Provisioned,
            ConditionReason::InProgress,
            ConditionStatus::False,
            format!("Resource group {} requested", group.id),
        )
        .await?;
        Ok(requeue_with_short_interval())
    }

    async fn handle_nodepool_processing(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<Action, AdaptorError> {
        let Some(id) = resource_group_id(nodepool) else {
            // Create was interrupted before the group id was recorded
            debug!("[dell-hwmgr] Nodepool {} has no resource group, submitting", nodepool.name_any());
            return self.handle_nodepool_create(hwmgr, nodepool).await;
        };

        let client = self.clients.client(hwmgr).await?;
        let group = match client.get_resource_group(id).await {
            Ok(group) => group,
            Err(e) if e.is_not_found() => {
                return Err(AdaptorError::AllocationFailed(format!("resource group {} not found", id)));
            }
            Err(e) => return Err(AdaptorError::from(e).context(format!("failed to query resource group {}", id))),
        };

        match group.state() {
            JobState::Pending | JobState::InProgress => {
                debug!("[dell-hwmgr] Resource group {} is {:?}", id, group.state());
                let message = match group.message() {
                    "" => format!("Resource group {} in progress", id),
                    msg => msg.to_string(),
                };
                update_nodepool_status_condition(
                    self.ctx.stores.nodepools.as_ref(),
                    &self.ctx.retry,
                    nodepool,
                    ConditionType::Provisioned,
                    ConditionReason::InProgress,
                    ConditionStatus::False,
                    message,
                )
                .await?;
                Ok(requeue_with_medium_interval())
            }
            JobState::Failed => Err(AdaptorError::AllocationFailed(format!(
                "resource group {} failed: {}",
                id,
                group.message()
            ))),
            JobState::Completed => self.complete_allocation(hwmgr, nodepool, &group.resources).await,
        }
    }

    async fn handle_nodepool_spec_changed(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<Action, AdaptorError> {
        if is_provisioned_failed(nodepool) {
            info!("[dell-hwmgr] Resubmitting failed nodepool {}", nodepool.name_any());
            self.release_resource_group(hwmgr, nodepool).await?;
            self.release_nodes(hwmgr, nodepool, true).await?;
            return self.handle_nodepool_create(hwmgr, nodepool).await;
        }

        // observedGeneration stays at the provisioned generation
        warn!(
            "[dell-hwmgr] Spec change of provisioned nodepool {} is not supported",
            nodepool.name_any()
        );
        update_nodepool_status_condition(
            self.ctx.stores.nodepools.as_ref(),
            &self.ctx.retry,
            nodepool,
            ConditionType::Validation,
            ConditionReason::Failed,
            ConditionStatus::False,
            "Spec changes to a provisioned nodepool are not supported by the dell-hwmgr adaptor",
        )
        .await?;
        Ok(do_not_requeue())
    }

    async fn release_node(&self, _hwmgr: &HardwareManager, _nodepool: &NodePool, node: &Node) -> Result<(), AdaptorError> {
        let secret = node
            .status
            .as_ref()
            .and_then(|s| s.bmc.as_ref())
            .map(|bmc| bmc.credentials_name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| bmc_secret_name(&node.name_any()));
        delete_bmc_secret(self.ctx.stores.secrets.as_ref(), &node.namespace().unwrap_or_default(), &secret).await?;
        Ok(())
    }

    async fn handle_nodepool_deletion(&self, hwmgr: &HardwareManager, nodepool: &NodePool) -> Result<bool, AdaptorError> {
        info!("[dell-hwmgr] Finalizing nodepool {}", nodepool.name_any());
        self.release_resource_group(hwmgr, nodepool).await?;
        self.release_nodes(hwmgr, nodepool, false).await?;
        Ok(true)
    }
}
