//! Hardware Manager Plugin CRD Definitions
//!
//! Kubernetes Custom Resource Definitions consumed and produced by the
//! hardware manager plugin controller:
//! - `NodePool` / `Node`: hardware requests and the machines allocated for them
//! - `HardwareManager`: selects the adaptor (loopback, metal3, dell-hwmgr)
//! - `HardwareProfile`: firmware and BIOS settings for a node group
//! - `BareMetalHost`: the metal3 host resource, read by the bare-metal adaptor

pub mod bare_metal_host;
pub mod condition;
pub mod hardware_manager;
pub mod hardware_profile;
pub mod node;
pub mod node_pool;

pub use bare_metal_host::*;
pub use condition::*;
pub use hardware_manager::*;
pub use hardware_profile::*;
pub use node::*;
pub use node_pool::*;
