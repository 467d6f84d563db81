//! Inventory projection of BareMetalHosts.

use super::node::bmh_key;
use super::{
    ANNOTATION_RESOURCE_INFO_DESCRIPTION, ANNOTATION_RESOURCE_INFO_GLOBAL_ASSET_ID, ANNOTATION_RESOURCE_INFO_GROUPS,
    ANNOTATION_RESOURCE_INFO_PART_NUMBER, LABEL_PREFIX_RESOURCE_SELECTOR, LABEL_RESOURCE_POOL_ID, LABEL_SITE_ID,
};
use crate::inventory::{
    AdminState, OperationalState, PowerState, ProcessorInfo, ResourceInfo, ResourcePoolInfo, UsageState,
};
use crds::{BareMetalHost, Node, ProvisioningState};
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Hosts carrying both pool and site labels in a usable state
pub fn include_in_inventory(bmh: &BareMetalHost) -> bool {
    let labels = bmh.labels();
    let labelled = [LABEL_RESOURCE_POOL_ID, LABEL_SITE_ID]
        .iter()
        .all(|key| labels.get(*key).is_some_and(|v| !v.is_empty()));

    labelled
        && matches!(
            bmh.provisioning_state(),
            ProvisioningState::Available
                | ProvisioningState::Provisioning
                | ProvisioningState::Provisioned
                | ProvisioningState::Preparing
        )
}

/// One entry per distinct resource pool among the inventoried hosts.
pub fn resource_pools(bmhs: &[BareMetalHost]) -> Vec<ResourcePoolInfo> {
    let mut pools: BTreeMap<String, ResourcePoolInfo> = BTreeMap::new();
    for bmh in bmhs.iter().filter(|bmh| include_in_inventory(bmh)) {
        let labels = bmh.labels();
        let pool_id = labels.get(LABEL_RESOURCE_POOL_ID).cloned().unwrap_or_default();
        let site_id = labels.get(LABEL_SITE_ID).cloned();
        pools.entry(pool_id.clone()).or_insert_with(|| ResourcePoolInfo {
            resource_pool_id: pool_id.clone(),
            name: pool_id.clone(),
            description: pool_id,
            site_id,
        });
    }
    pools.into_values().collect()
}

fn annotation(bmh: &BareMetalHost, key: &str) -> String {
    bmh.annotations().get(key).cloned().unwrap_or_default()
}

/// Comma separated groups, whitespace around the commas dropped
fn groups(bmh: &BareMetalHost) -> Option<Vec<String>> {
    bmh.annotations()
        .get(ANNOTATION_RESOURCE_INFO_GROUPS)
        .map(|raw| raw.split(',').map(|g| g.trim_matches(' ').to_string()).collect())
}

fn tags(bmh: &BareMetalHost) -> Vec<String> {
    bmh.labels()
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(LABEL_PREFIX_RESOURCE_SELECTOR)
                .map(|selector| format!("{}: {}", selector, value))
        })
        .collect()
}

/// Projects a host, and the Node allocated from it if any, into the
/// generic resource record.
pub fn resource_info(bmh: &BareMetalHost, node: Option<&Node>) -> ResourceInfo {
    let status = bmh.status.as_ref();
    let details = status.and_then(|s| s.hardware_details.as_ref());
    let labels = bmh.labels();

    let power_state = if status.is_some_and(|s| s.powered_on) {
        PowerState::On
    } else {
        PowerState::Off
    };

    let processors = details
        .map(|d| {
            vec![ProcessorInfo {
                architecture: d.cpu.arch.clone(),
                cores: Some(d.cpu.count),
                manufacturer: String::new(),
                model: d.cpu.model.clone(),
            }]
        })
        .unwrap_or_default();

    ResourceInfo {
        resource_id: bmh_key(&bmh.namespace().unwrap_or_default(), &bmh.name_any()),
        resource_pool_id: labels.get(LABEL_RESOURCE_POOL_ID).cloned().unwrap_or_default(),
        name: bmh.name_any(),
        description: annotation(bmh, ANNOTATION_RESOURCE_INFO_DESCRIPTION),
        admin_state: AdminState::Unknown,
        operational_state: OperationalState::Unknown,
        usage_state: UsageState::Unknown,
        power_state: Some(power_state),
        global_asset_id: annotation(bmh, ANNOTATION_RESOURCE_INFO_GLOBAL_ASSET_ID),
        groups: groups(bmh),
        labels: (!labels.is_empty()).then(|| labels.clone()),
        tags: tags(bmh),
        hw_profile: node
            .and_then(|n| n.status.as_ref())
            .map(|s| s.hw_profile.clone())
            .unwrap_or_default(),
        memory: details.map_or(0, |d| d.ram_mebibytes),
        model: details.map(|d| d.system_vendor.product_name.clone()).unwrap_or_default(),
        vendor: details.map(|d| d.system_vendor.manufacturer.clone()).unwrap_or_default(),
        part_number: annotation(bmh, ANNOTATION_RESOURCE_INFO_PART_NUMBER),
        serial_number: details.map(|d| d.system_vendor.serial_number.clone()).unwrap_or_default(),
        processors,
    }
}
