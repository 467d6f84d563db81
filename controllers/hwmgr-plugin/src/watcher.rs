//! Kubernetes resource watchers.
//!
//! NodePools are watched together with the Nodes they own, so a Node status
//! change re-triggers reconciliation of its pool. HardwareManagers are
//! watched separately to keep their Validation condition current.
//!
//! Both watchers share `run_controller`, which wraps `kube_runtime::Controller`
//! with debounce, bounded concurrency and per-object Fibonacci backoff on
//! errors.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{HardwareManager, Node, NodePool};
use futures::StreamExt;
use kube::{Api, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::{Controller, watcher};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Drives a configured `Controller` until its watch stream ends.
///
/// `reconcile_fn` receives the object's namespace and name; the object
/// itself is re-read by the reconciler so it never acts on a stale cache
/// entry.
async fn run_controller<K, F, Fut>(
    controller: Controller<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    resource_name: &'static str,
) -> Result<(), ControllerError>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Debug + Unpin,
    F: Fn(Arc<Reconciler>, String, String) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<Action, ControllerError>> + Send + 'static,
{
    info!("Starting {} watcher", resource_name);

    let error_policy = move |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any());
        let delay = ctx.error_backoff(&key);
        error!(
            "Reconciliation error for {} {}: {} (retrying in {}s)",
            resource_name,
            key,
            error,
            delay.as_secs()
        );
        Action::requeue(delay)
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            let namespace = obj.namespace().unwrap_or_default();
            let name = obj.name_any();
            debug!("Reconciling {} {}/{}", resource_name, namespace, name);
            reconcile_fn(ctx, namespace, name).await
        }
    };

    controller
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((obj, action)) => debug!("Reconciled {} {}: {:?}", resource_name, obj, action),
                Err(e) => warn!("Controller error for {}: {}", resource_name, e),
            }
        })
        .await;

    Ok(())
}

/// Watches NodePools, their Nodes, and HardwareManagers.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    nodepool_api: Api<NodePool>,
    node_api: Api<Node>,
    hardware_manager_api: Api<HardwareManager>,
    concurrency: u16,
    debounce: Duration,
}

impl Watcher {
    pub fn new(
        reconciler: Arc<Reconciler>,
        nodepool_api: Api<NodePool>,
        node_api: Api<Node>,
        hardware_manager_api: Api<HardwareManager>,
        concurrency: u16,
        debounce: Duration,
    ) -> Self {
        Self {
            reconciler,
            nodepool_api,
            node_api,
            hardware_manager_api,
            concurrency,
            debounce,
        }
    }

    fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig::default()
            .debounce(self.debounce)
            .concurrency(self.concurrency)
    }

    /// Starts watching NodePools and the Nodes they own.
    pub async fn watch_nodepools(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.nodepool_api.clone(), watcher::Config::default())
            .owns(self.node_api.clone(), watcher::Config::default())
            .with_config(self.runtime_config());

        run_controller(
            controller,
            self.reconciler.clone(),
            |reconciler, namespace, name| async move { reconciler.reconcile_nodepool(&namespace, &name).await },
            "NodePool",
        )
        .await
    }

    /// Starts watching HardwareManagers.
    pub async fn watch_hardware_managers(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.hardware_manager_api.clone(), watcher::Config::default())
            .with_config(self.runtime_config());

        run_controller(
            controller,
            self.reconciler.clone(),
            |reconciler, namespace, name| async move {
                reconciler.reconcile_hardware_manager(&namespace, &name).await
            },
            "HardwareManager",
        )
        .await
    }
}
