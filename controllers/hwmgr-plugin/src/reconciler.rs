//! NodePool reconciliation entry point.
//!
//! Resolves the HardwareManager and adaptor for a NodePool, runs the
//! deletion path or the adaptor's state machine, and turns adaptor errors
//! into NodePool conditions:
//! - transient errors leave the pool Provisioned=False/InProgress and requeue
//! - permanent errors fail the pool until its spec changes
//! - anything else is returned to the controller for re-delivery with backoff

use crate::adaptors::{AdaptorContext, AdaptorError, AdaptorRegistry, BoxedAdaptor};
use crate::backoff::BackoffTracker;
use crate::conditions::set_status_condition;
use crate::error::ControllerError;
use crate::fsm::{do_not_requeue, requeue_with_medium_interval, requeue_with_short_interval};
use crate::nodepool::{
    add_finalizer, complete_nodepool_transition, derive_nodepool_status_from_nodes, has_finalizer,
    is_being_deleted, is_provisioned_completed, list_nodes_for_nodepool, namespace_of, remove_finalizer,
    update_nodepool_status_condition,
};
use crate::retry::retry_on_conflict_or_retriable;
use crate::store::StoreError;
use crds::{ConditionReason, ConditionStatus, ConditionType, HardwareManager, HardwareManagerStatus, NodePool};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Reconciles NodePools and validates HardwareManagers.
#[derive(Debug)]
pub struct Reconciler {
    ctx: AdaptorContext,
    registry: AdaptorRegistry,
    backoff: BackoffTracker,
}

impl Reconciler {
    pub fn new(ctx: AdaptorContext, registry: AdaptorRegistry) -> Self {
        Self {
            ctx,
            registry,
            backoff: BackoffTracker::default(),
        }
    }

    pub fn context(&self) -> &AdaptorContext {
        &self.ctx
    }

    /// Requeue delay after a failed reconciliation of `key`
    pub fn error_backoff(&self, key: &str) -> Duration {
        self.backoff.next_backoff(key)
    }

    async fn get_hardware_manager(&self, name: &str) -> Result<HardwareManager, ControllerError> {
        match self.ctx.stores.hardware_managers.get(&self.ctx.namespace, name).await {
            Ok(hwmgr) => Ok(hwmgr),
            Err(e) if e.is_not_found() => Err(ControllerError::HardwareManagerNotFound(format!(
                "{}/{}",
                self.ctx.namespace, name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn adaptor_for(&self, hwmgr: &HardwareManager) -> Result<BoxedAdaptor, ControllerError> {
        self.registry
            .get(hwmgr.spec.adaptor_id)
            .ok_or(ControllerError::UnknownAdaptor(hwmgr.spec.adaptor_id))
    }

    /// Reconciles the NodePool stored under `namespace/name`.
    pub async fn reconcile_nodepool(&self, namespace: &str, name: &str) -> Result<Action, ControllerError> {
        let key = format!("{}/{}", namespace, name);
        let result = self.reconcile_nodepool_inner(namespace, name).await;
        if result.is_ok() {
            self.backoff.reset(&key);
        }
        result
    }

    async fn reconcile_nodepool_inner(&self, namespace: &str, name: &str) -> Result<Action, ControllerError> {
        let nodepool = match self.ctx.stores.nodepools.get(namespace, name).await {
            Ok(nodepool) => nodepool,
            Err(e) if e.is_not_found() => {
                debug!("NodePool {}/{} no longer exists", namespace, name);
                return Ok(do_not_requeue());
            }
            Err(e) => return Err(e.into()),
        };

        let hwmgr = self.get_hardware_manager(&nodepool.spec.hw_mgr_id).await?;
        let adaptor = self.adaptor_for(&hwmgr)?;

        if is_being_deleted(&nodepool) {
            return self.finalize_nodepool(&hwmgr, &adaptor, &nodepool).await;
        }

        let nodepool = add_finalizer(self.ctx.stores.nodepools.as_ref(), &self.ctx.retry, &nodepool).await?;

        let result = adaptor.handle_nodepool(&hwmgr, &nodepool).await;
        let action = self.apply_adaptor_result(&nodepool, result).await?;

        self.update_configured_status(namespace, name).await?;
        Ok(action)
    }

    /// Releases the pool's hardware and drops the finalizer once every
    /// release has succeeded.
    async fn finalize_nodepool(
        &self,
        hwmgr: &HardwareManager,
        adaptor: &BoxedAdaptor,
        nodepool: &NodePool,
    ) -> Result<Action, ControllerError> {
        if !has_finalizer(nodepool) {
            return Ok(do_not_requeue());
        }

        info!("NodePool {} is being deleted", nodepool.name_any());
        match adaptor.handle_nodepool_deletion(hwmgr, nodepool).await {
            Ok(true) => {
                remove_finalizer(self.ctx.stores.nodepools.as_ref(), &self.ctx.retry, nodepool).await?;
                info!("NodePool {} finalized", nodepool.name_any());
                Ok(do_not_requeue())
            }
            Ok(false) => {
                debug!("NodePool {} release still in progress", nodepool.name_any());
                Ok(requeue_with_short_interval())
            }
            Err(e) => {
                error!("Failed to release nodepool {}: {}", nodepool.name_any(), e);
                Err(e.into())
            }
        }
    }

    /// Records an adaptor failure on the NodePool.
    async fn apply_adaptor_result(
        &self,
        nodepool: &NodePool,
        result: Result<Action, AdaptorError>,
    ) -> Result<Action, ControllerError> {
        let err = match result {
            Ok(action) => return Ok(action),
            Err(err) => err,
        };
        let store = self.ctx.stores.nodepools.as_ref();

        if err.is_transient() {
            warn!("NodePool {} hit a transient error: {}", nodepool.name_any(), err);
            update_nodepool_status_condition(
                store,
                &self.ctx.retry,
                nodepool,
                ConditionType::Provisioned,
                ConditionReason::InProgress,
                ConditionStatus::False,
                err.to_string(),
            )
            .await?;
            return Ok(requeue_with_medium_interval());
        }

        if err.is_permanent() {
            error!("NodePool {} failed: {}", nodepool.name_any(), err);
            complete_nodepool_transition(
                store,
                &self.ctx.retry,
                nodepool,
                ConditionReason::Failed,
                ConditionStatus::False,
                err.to_string(),
            )
            .await?;
            return Ok(do_not_requeue());
        }

        Err(err.into())
    }

    /// Projects child Node configuration onto a provisioned pool. The write
    /// is skipped when the Configured condition already matches.
    async fn update_configured_status(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        let nodepool = match self.ctx.stores.nodepools.get(namespace, name).await {
            Ok(nodepool) => nodepool,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if !is_provisioned_completed(&nodepool) {
            return Ok(());
        }

        let nodes = list_nodes_for_nodepool(self.ctx.stores.nodes.as_ref(), &nodepool).await?;
        let (status, reason, message) = derive_nodepool_status_from_nodes(self.ctx.stores.nodes.as_ref(), &nodes).await;
        update_nodepool_status_condition(
            self.ctx.stores.nodepools.as_ref(),
            &self.ctx.retry,
            &nodepool,
            ConditionType::Configured,
            reason,
            status,
            message,
        )
        .await?;
        Ok(())
    }

    /// Checks that a HardwareManager's backend is usable and records the
    /// outcome in its Validation condition.
    pub async fn reconcile_hardware_manager(&self, namespace: &str, name: &str) -> Result<Action, ControllerError> {
        let hwmgr = match self.ctx.stores.hardware_managers.get(namespace, name).await {
            Ok(hwmgr) => hwmgr,
            Err(e) if e.is_not_found() => return Ok(do_not_requeue()),
            Err(e) => return Err(e.into()),
        };
        let adaptor = self.adaptor_for(&hwmgr)?;

        let (status, reason, message, action) = match adaptor.validate_hardware_manager(&hwmgr).await {
            Ok(()) => (
                ConditionStatus::True,
                ConditionReason::Completed,
                "Validated".to_string(),
                do_not_requeue(),
            ),
            Err(e) => {
                warn!("HardwareManager {}/{} failed validation: {}", namespace, name, e);
                (
                    ConditionStatus::False,
                    ConditionReason::Failed,
                    e.to_string(),
                    requeue_with_medium_interval(),
                )
            }
        };

        self.update_hardware_manager_validation(&hwmgr, status, reason, &message)
            .await?;
        Ok(action)
    }

    async fn update_hardware_manager_validation(
        &self,
        hwmgr: &HardwareManager,
        status: ConditionStatus,
        reason: ConditionReason,
        message: &str,
    ) -> Result<(), StoreError> {
        let store = self.ctx.stores.hardware_managers.as_ref();
        let namespace = namespace_of(hwmgr)?;
        let name = hwmgr.name_any();
        let (namespace, name) = (&namespace, &name);

        retry_on_conflict_or_retriable(&self.ctx.retry, || async move {
            let mut fresh = store.get(namespace, name).await?;
            let status_block = fresh.status.get_or_insert_with(HardwareManagerStatus::default);
            let changed = set_status_condition(
                &mut status_block.conditions,
                ConditionType::Validation,
                reason,
                status,
                message,
            );
            if !changed {
                return Ok(());
            }
            store.replace_status(namespace, &fresh).await.map(|_| ())
        })
        .await
    }
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod reconciler_test;
