//! BareMetalHost CRD
//!
//! Subset of the metal3 BareMetalHost resource consumed by the bare-metal
//! adaptor. Only the fields read or written by this controller are modelled.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "metal3.io",
    version = "v1alpha1",
    kind = "BareMetalHost",
    namespaced,
    status = "BareMetalHostStatus",
    shortname = "bmh"
)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostSpec {
    /// Whether the host should be powered on
    #[serde(default)]
    pub online: bool,

    /// BMC connection details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bmc: Option<BmcDetails>,

    /// MAC address of the NIC used for provisioning
    #[serde(default, rename = "bootMACAddress", skip_serializing_if = "String::is_empty")]
    pub boot_mac_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BmcDetails {
    pub address: String,

    #[serde(default)]
    pub credentials_name: String,

    #[serde(default)]
    pub disable_certificate_verification: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostStatus {
    #[serde(default)]
    pub provisioning: ProvisionStatus,

    /// Inspected hardware, absent until inspection completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_details: Option<HardwareDetails>,

    #[serde(default)]
    pub powered_on: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionStatus {
    #[serde(default)]
    pub state: ProvisioningState,
}

/// Provisioning state of a host
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ProvisioningState {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "unmanaged")]
    Unmanaged,
    #[serde(rename = "registering")]
    Registering,
    #[serde(rename = "inspecting")]
    Inspecting,
    #[serde(rename = "preparing")]
    Preparing,
    #[serde(rename = "available")]
    Available,
    #[serde(rename = "provisioning")]
    Provisioning,
    #[serde(rename = "provisioned")]
    Provisioned,
    #[serde(rename = "deprovisioning")]
    Deprovisioning,
    #[serde(rename = "externally provisioned")]
    ExternallyProvisioned,
    #[serde(rename = "deleting")]
    Deleting,
    /// Any state not modelled above
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HardwareDetails {
    #[serde(default)]
    pub ram_mebibytes: i64,

    #[serde(default)]
    pub system_vendor: SystemVendor,

    #[serde(default)]
    pub cpu: Cpu,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nics: Vec<Nic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SystemVendor {
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub serial_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct Cpu {
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct Nic {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mac: String,
}

impl BareMetalHost {
    /// Current provisioning state, `None` when no status has been written
    pub fn provisioning_state(&self) -> ProvisioningState {
        self.status
            .as_ref()
            .map_or(ProvisioningState::None, |s| s.provisioning.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provisioning_state_deserializes_as_other() {
        let status: ProvisionStatus =
            serde_json::from_value(serde_json::json!({ "state": "match profile" }))
                .expect("deserialize provisioning status");
        assert_eq!(status.state, ProvisioningState::Other);
    }

    #[test]
    fn test_known_provisioning_states() {
        let status: ProvisionStatus =
            serde_json::from_value(serde_json::json!({ "state": "externally provisioned" }))
                .expect("deserialize provisioning status");
        assert_eq!(status.state, ProvisioningState::ExternallyProvisioned);

        let status: ProvisionStatus = serde_json::from_value(serde_json::json!({}))
            .expect("deserialize empty provisioning status");
        assert_eq!(status.state, ProvisioningState::None);
    }
}
