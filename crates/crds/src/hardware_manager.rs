//! HardwareManager CRD
//!
//! Identifies which adaptor, and which backend endpoint, a NodePool is
//! reconciled against.

use crate::condition::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "hwmgr-plugin.oran.openshift.io",
    version = "v1alpha1",
    kind = "HardwareManager",
    namespaced,
    status = "HardwareManagerStatus",
    shortname = "hwmgr"
)]
#[serde(rename_all = "camelCase")]
pub struct HardwareManagerSpec {
    /// Adaptor handling requests for this manager
    pub adaptor_id: AdaptorId,

    /// Loopback adaptor settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loopback_data: Option<LoopbackData>,

    /// Bare-metal adaptor settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metal3_data: Option<Metal3Data>,

    /// Vendor API adaptor settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dell_data: Option<DellData>,
}

/// Adaptor identifier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default)]
pub enum AdaptorId {
    /// No-op test backend driven by a ConfigMap
    #[default]
    #[serde(rename = "loopback")]
    Loopback,

    /// Bare-metal provisioning backend (BareMetalHost)
    #[serde(rename = "metal3")]
    Metal3,

    /// Vendor hardware manager REST API
    #[serde(rename = "dell-hwmgr")]
    DellHwMgr,
}

impl AdaptorId {
    /// Returns the wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            AdaptorId::Loopback => "loopback",
            AdaptorId::Metal3 => "metal3",
            AdaptorId::DellHwMgr => "dell-hwmgr",
        }
    }
}

impl fmt::Display for AdaptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoopbackData {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub additional_info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Metal3Data {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub additional_info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DellData {
    /// Base URL of the vendor hardware manager API
    pub api_url: String,

    /// Secret holding the API token (key "token")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auth_secret: String,

    /// Tenant the resource groups are created under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct HardwareManagerStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
