//! HardwareProfile CRD
//!
//! Desired firmware and BIOS settings applied to the nodes of a group.

use crate::condition::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "hwmgr-plugin.oran.openshift.io",
    version = "v1alpha1",
    kind = "HardwareProfile",
    namespaced,
    status = "HardwareProfileStatus",
    shortname = "hwprofile"
)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfileSpec {
    /// BIOS attributes
    #[serde(default)]
    pub bios: Bios,

    /// Desired BIOS firmware version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bios_version: String,

    /// Desired BMC firmware version
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bmc_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct Bios {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, BiosAttributeValue>,
}

/// A BIOS attribute is either an integer or a string
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(untagged)]
pub enum BiosAttributeValue {
    Int(i64),
    String(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfileStatus {
    #[serde(default)]
    pub observed_generation: i64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
