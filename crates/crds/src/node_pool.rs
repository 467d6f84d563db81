//! NodePool CRD
//!
//! A declarative request for a set of physical machines, grouped by named
//! node group and hardware profile.

use crate::condition::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "o2ims-hardwaremanagement.oran.openshift.io",
    version = "v1alpha1",
    kind = "NodePool",
    namespaced,
    status = "NodePoolStatus",
    shortname = "np"
)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolSpec {
    /// Identifier of the cloud (cluster) the nodes are requested for
    pub cloud_id: String,

    /// Name of the HardwareManager this pool is reconciled against
    pub hw_mgr_id: String,

    /// Requested node groups
    #[serde(default)]
    pub node_group: Vec<NodeGroup>,

    /// Free-form attributes consumed opaquely by the adaptor
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    /// Group definition
    pub node_pool_data: NodeGroupData,

    /// Number of nodes requested for the group
    pub size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupData {
    /// Group name
    pub name: String,

    /// Role of the nodes in the group (e.g. "master", "worker")
    #[serde(default)]
    pub role: String,

    /// Name of the HardwareProfile applied to the nodes
    pub hw_profile: String,

    /// Pool the nodes are allocated from
    #[serde(default)]
    pub resource_pool_id: String,

    /// Label selectors narrowing the candidate resources
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resource_selector: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolStatus {
    /// Ordered condition list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Backend-specific properties recorded during allocation
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    /// Resource pool selected per node group
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selected_pools: BTreeMap<String, String>,

    /// Plugin bookkeeping
    #[serde(default)]
    pub hw_mgr_plugin: HwMgrPluginStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HwMgrPluginStatus {
    /// Generation of the last spec reconciled to a terminal state
    #[serde(default)]
    pub observed_generation: i64,
}

impl NodePool {
    /// Conditions of the pool, empty when no status has been written
    pub fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map_or(&[], |s| s.conditions.as_slice())
    }

    /// Recorded ObservedGeneration, zero when unset
    pub fn observed_generation(&self) -> i64 {
        self.status
            .as_ref()
            .map_or(0, |s| s.hw_mgr_plugin.observed_generation)
    }

    /// metadata.generation, zero when unset
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or_default()
    }
}
