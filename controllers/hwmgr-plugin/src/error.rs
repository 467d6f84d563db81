//! Controller-specific error types.
//!
//! Errors returned to the kube-runtime controller. Each one is logged by the
//! error policy and the object is requeued with backoff.

use crate::adaptors::AdaptorError;
use crate::store::StoreError;
use crds::AdaptorId;
use hwmgr_client::HwMgrError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the hardware manager plugin controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Object store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Adaptor error that is neither transient nor permanent
    #[error("Adaptor error: {0}")]
    Adaptor(#[from] AdaptorError),

    /// Hardware manager API error
    #[error("Hardware manager error: {0}")]
    HwMgr(#[from] HwMgrError),

    /// HardwareManager referenced by a NodePool not found
    #[error("HardwareManager not found: {0}")]
    HardwareManagerNotFound(String),

    /// No adaptor registered for the HardwareManager's adaptor id
    #[error("No adaptor registered for {0}")]
    UnknownAdaptor(AdaptorId),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
