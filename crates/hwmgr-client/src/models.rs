//! Hardware manager API models
//!
//! Wire types for resource pools, resources and resource groups.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A pool of interchangeable resources at a site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePool {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
}

/// A physical server known to the hardware manager
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub resource_pool_id: String,
    #[serde(rename = "resourceProfileID", default)]
    pub resource_profile_id: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub memory_mib: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_attribute: Option<ResourceAttribute>,
    /// Vendor extension data, keyed by extension name then field name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, BTreeMap<String, serde_json::Value>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAttribute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute: Option<ComputeAttribute>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComputeAttribute {
    /// Lights-out management (BMC) access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lom: Option<Lom>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Lom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Request to allocate resources for a set of node groups
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Backend-defined resource type identifier
    pub resource_type_id: String,
    /// Selectors keyed by node group name
    pub resource_selectors: BTreeMap<String, ResourceSelector>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelector {
    pub resource_pool_id: String,
    #[serde(rename = "resourceProfileID")]
    pub resource_profile_id: String,
    pub num_resources: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
}

/// A resource group and the state of the job fulfilling it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResourceGroupStatus>,
    /// Resources allocated to the group, populated once the job completes
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl ResourceGroup {
    /// Job state, `Pending` when the backend has not reported one
    pub fn state(&self) -> JobState {
        self.status.as_ref().map_or(JobState::Pending, |s| s.state)
    }

    /// Job message, empty when the backend has not reported one
    pub fn message(&self) -> &str {
        self.status.as_ref().map_or("", |s| s.message.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupStatus {
    #[serde(default)]
    pub state: JobState,
    #[serde(default)]
    pub message: String,
}

/// State of an asynchronous backend job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_deserializes_lom_and_extensions() {
        let resource: Resource = serde_json::from_value(serde_json::json!({
            "id": "server-1",
            "name": "server-1.example.com",
            "resourcePoolId": "pool-a",
            "resourceProfileID": "profile-a",
            "resourceAttribute": {
                "compute": { "lom": { "ipAddress": "192.0.2.10", "password": "bmc-secret" } }
            },
            "extensions": {
                "O2-nics": { "nads": [] }
            }
        }))
        .expect("deserialize resource");

        let lom = resource
            .resource_attribute
            .and_then(|a| a.compute)
            .and_then(|c| c.lom)
            .expect("lom present");
        assert_eq!(lom.ip_address.as_deref(), Some("192.0.2.10"));
        assert!(resource.extensions.expect("extensions present").contains_key("O2-nics"));
    }

    #[test]
    fn test_resource_group_state_defaults_to_pending() {
        let group: ResourceGroup =
            serde_json::from_value(serde_json::json!({ "id": "rg-1" })).expect("deserialize group");
        assert_eq!(group.state(), JobState::Pending);
        assert_eq!(group.message(), "");

        let group: ResourceGroup = serde_json::from_value(serde_json::json!({
            "id": "rg-1",
            "status": { "state": "IN_PROGRESS", "message": "allocating" }
        }))
        .expect("deserialize group");
        assert_eq!(group.state(), JobState::InProgress);
    }
}
