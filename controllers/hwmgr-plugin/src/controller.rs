//! Main controller implementation.
//!
//! Wires the API-server backed stores, the adaptor registry and the
//! reconciler together, then runs the NodePool and HardwareManager watchers
//! until one of them exits.

use crate::adaptors::dell::HwMgrClientFactory;
use crate::adaptors::{AdaptorContext, AdaptorRegistry};
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::inventory::InventoryService;
use crate::reconciler::Reconciler;
use crate::retry::RetryPolicy;
use crate::store::Stores;
use crate::watcher::Watcher;
use crds::{HardwareManager, Node, NodePool};
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for NodePool reconciliation.
pub struct Controller {
    nodepool_watcher: JoinHandle<Result<(), ControllerError>>,
    hardware_manager_watcher: JoinHandle<Result<(), ControllerError>>,
    inventory: Arc<InventoryService>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing hardware manager plugin controller");

        let kube_client = Client::try_default().await?;
        let stores = Stores::kube(kube_client.clone());

        let ctx = AdaptorContext {
            stores: stores.clone(),
            namespace: config.plugin_namespace.clone(),
            retry: RetryPolicy::default(),
        };
        let dell_clients = Arc::new(HwMgrClientFactory::new(
            stores.secrets.clone(),
            config.plugin_namespace.clone(),
            config.hwmgr_token.clone(),
        ));
        let registry = AdaptorRegistry::with_builtin(&ctx, dell_clients);
        info!("Registered adaptors: {:?}", registry);

        let inventory = Arc::new(InventoryService::new(
            stores.hardware_managers.clone(),
            registry.clone(),
            config.plugin_namespace.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(ctx, registry));

        let (nodepool_api, node_api): (Api<NodePool>, Api<Node>) = match config.watch_namespace.as_deref() {
            Some(ns) => (
                Api::namespaced(kube_client.clone(), ns),
                Api::namespaced(kube_client.clone(), ns),
            ),
            None => (Api::all(kube_client.clone()), Api::all(kube_client.clone())),
        };
        let hardware_manager_api: Api<HardwareManager> = Api::namespaced(kube_client, &config.plugin_namespace);

        let watcher = Arc::new(Watcher::new(
            reconciler,
            nodepool_api,
            node_api,
            hardware_manager_api,
            config.reconcile_concurrency,
            config.reconcile_debounce,
        ));

        let nodepool_watcher = {
            let watcher = watcher.clone();
            tokio::spawn(async move { watcher.watch_nodepools().await })
        };

        let hardware_manager_watcher = {
            let watcher = watcher;
            tokio::spawn(async move { watcher.watch_hardware_managers().await })
        };

        Ok(Self {
            nodepool_watcher,
            hardware_manager_watcher,
            inventory,
        })
    }

    /// Inventory query facade backed by the same adaptors
    pub fn inventory(&self) -> Arc<InventoryService> {
        self.inventory.clone()
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Hardware manager plugin controller running");

        // Watchers run forever; the first one to exit ends the controller
        tokio::select! {
            result = &mut self.nodepool_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("NodePool watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("NodePool watcher error: {}", e)))?;
            }
            result = &mut self.hardware_manager_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("HardwareManager watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("HardwareManager watcher error: {}", e)))?;
            }
        }

        Ok(())
    }
}
