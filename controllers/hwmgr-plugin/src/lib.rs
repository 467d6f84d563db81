//! Hardware Manager Plugin Controller
//!
//! Reconciles `NodePool` requests against pluggable hardware backends:
//! - `loopback`: test backend driven by a ConfigMap inventory
//! - `metal3`: bare-metal hosts (`BareMetalHost`)
//! - `dell-hwmgr`: vendor hardware manager REST API
//!
//! The NodePool's condition list is its state. Each pass classifies it
//! (`fsm`), runs the matching adaptor handler, and writes status back
//! through the conflict-retrying helpers in `nodepool`. The inventory
//! projection (`inventory`) serves read-only resource pool and resource
//! queries from the same adaptors.

pub mod adaptors;
pub mod backoff;
pub mod conditions;
pub mod config;
pub mod controller;
pub mod error;
pub mod fsm;
pub mod inventory;
pub mod nodepool;
pub mod reconciler;
pub mod retry;
pub mod store;
pub mod watcher;

#[cfg(test)]
mod test_utils;
