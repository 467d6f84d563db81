//! Node CRD
//!
//! One per allocated physical machine, owned by exactly one NodePool.

use crate::condition::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "o2ims-hardwaremanagement.oran.openshift.io",
    version = "v1alpha1",
    kind = "Node",
    namespaced,
    status = "NodeStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    /// Name of the owning NodePool
    pub node_pool: String,

    /// Node group within the pool
    pub group_name: String,

    /// HardwareProfile requested for the node
    pub hw_profile: String,

    /// HardwareManager the node was allocated from
    #[serde(default)]
    pub hw_mgr_id: String,

    /// Backend identifier of the physical machine
    #[serde(default)]
    pub hw_mgr_node_id: String,

    /// Backend namespace of the physical machine, if any
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hw_mgr_node_ns: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// BMC connection details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc: Option<Bmc>,

    /// Network interfaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,

    /// HardwareProfile currently applied
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hw_profile: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bmc {
    /// BMC address (URL)
    pub address: String,

    /// Name of the Secret holding BMC credentials
    #[serde(default)]
    pub credentials_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    pub name: String,

    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub mac_address: String,
}

impl Node {
    /// Conditions of the node, empty when no status has been written
    pub fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map_or(&[], |s| s.conditions.as_slice())
    }
}
