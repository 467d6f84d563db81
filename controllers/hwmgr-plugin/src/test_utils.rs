//! Test fixtures shared by unit tests.

use crate::adaptors::AdaptorContext;
use crate::retry::RetryPolicy;
use crate::store::memory::MemoryStore;
use crate::store::Stores;
use chrono::Utc;
use crds::*;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_NAMESPACE: &str = "oran-hwmgr-plugin";
pub const BMH_NAMESPACE: &str = "hardware";
pub const HWMGR_NAME: &str = "hwmgr";

/// Memory stores with typed handles for seeding and inspection.
#[derive(Default)]
pub struct TestStores {
    pub nodepools: Arc<MemoryStore<NodePool>>,
    pub nodes: Arc<MemoryStore<Node>>,
    pub hardware_managers: Arc<MemoryStore<HardwareManager>>,
    pub hardware_profiles: Arc<MemoryStore<HardwareProfile>>,
    pub config_maps: Arc<MemoryStore<ConfigMap>>,
    pub secrets: Arc<MemoryStore<Secret>>,
    pub bare_metal_hosts: Arc<MemoryStore<BareMetalHost>>,
}

impl TestStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stores(&self) -> Stores {
        Stores {
            nodepools: self.nodepools.clone(),
            nodes: self.nodes.clone(),
            hardware_managers: self.hardware_managers.clone(),
            hardware_profiles: self.hardware_profiles.clone(),
            config_maps: self.config_maps.clone(),
            secrets: self.secrets.clone(),
            bare_metal_hosts: self.bare_metal_hosts.clone(),
        }
    }

    pub fn context(&self) -> AdaptorContext {
        AdaptorContext {
            stores: self.stores(),
            namespace: TEST_NAMESPACE.to_string(),
            retry: fast_retry(),
        }
    }

    /// Current stored copy of a NodePool
    pub fn nodepool(&self, name: &str) -> NodePool {
        self.nodepools
            .fetch(TEST_NAMESPACE, name)
            .expect("nodepool should exist")
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        steps: 5,
        initial: Duration::from_millis(1),
        factor: 2.0,
        cap: Duration::from_millis(5),
    }
}

pub fn condition(type_: &str, status: ConditionStatus, reason: &str, message: &str) -> Condition {
    Condition {
        type_: type_.to_string(),
        status,
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: Utc::now(),
    }
}

/// NodePool with groups given as (name, resource pool, hardware profile, size)
pub fn nodepool(name: &str, groups: &[(&str, &str, &str, u32)]) -> NodePool {
    let node_group = groups
        .iter()
        .map(|(group, pool, profile, size)| NodeGroup {
            node_pool_data: NodeGroupData {
                name: (*group).to_string(),
                role: (*group).to_string(),
                hw_profile: (*profile).to_string(),
                resource_pool_id: (*pool).to_string(),
                resource_selector: BTreeMap::new(),
            },
            size: *size,
        })
        .collect();

    let mut np = NodePool::new(
        name,
        NodePoolSpec {
            cloud_id: format!("{}-cloud", name),
            hw_mgr_id: HWMGR_NAME.to_string(),
            node_group,
            extensions: BTreeMap::new(),
        },
    );
    np.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    np
}

pub fn hardware_manager(adaptor_id: AdaptorId) -> HardwareManager {
    let mut hwmgr = HardwareManager::new(
        HWMGR_NAME,
        HardwareManagerSpec {
            adaptor_id,
            loopback_data: None,
            metal3_data: None,
            dell_data: (adaptor_id == AdaptorId::DellHwMgr).then(|| DellData {
                api_url: "https://hwmgr.example.com".to_string(),
                auth_secret: String::new(),
                tenant: None,
            }),
        },
    );
    hwmgr.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    hwmgr
}

pub fn hardware_profile(name: &str) -> HardwareProfile {
    let mut profile = HardwareProfile::new(
        name,
        HardwareProfileSpec {
            bios: Bios::default(),
            bios_version: "2.1.0".to_string(),
            bmc_version: "6.10".to_string(),
        },
    );
    profile.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    profile
}

pub fn node(name: &str, pool: &str, conditions: Vec<Condition>) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: NodeSpec {
            node_pool: pool.to_string(),
            group_name: "workers".to_string(),
            hw_profile: "profile-a".to_string(),
            ..Default::default()
        },
        status: Some(NodeStatus {
            conditions,
            ..Default::default()
        }),
    }
}

/// Loopback inventory ConfigMap with `count` free nodes per pool
pub fn loopback_inventory(pools: &[(&str, usize)]) -> ConfigMap {
    let mut resources = String::from("resourcepools:\n");
    for (pool, _) in pools {
        resources.push_str(&format!("  - {}\n", pool));
    }
    resources.push_str("nodes:\n");
    for (pool, count) in pools {
        for i in 0..*count {
            resources.push_str(&format!(
                "  {pool}-node-{i}:\n    poolID: {pool}\n    bmc:\n      address: \"redfish+https://192.0.2.{i}/redfish/v1/Systems/1\"\n      username-base64: YWRtaW4=\n      password-base64: c2VjcmV0\n    interfaces:\n      - name: eno1\n        label: bootable-interface\n        macAddress: \"00:00:5e:00:53:0{i}\"\n    hostname: {pool}-node-{i}.example.com\n",
            ));
        }
    }

    let mut data = BTreeMap::new();
    data.insert("resources".to_string(), resources);
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(crate::adaptors::loopback::INVENTORY_CONFIGMAP.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// BareMetalHost labelled for inventory in the given pool
pub fn bare_metal_host(name: &str, pool: &str, state: ProvisioningState) -> BareMetalHost {
    let mut labels = BTreeMap::new();
    labels.insert(crate::adaptors::metal3::LABEL_RESOURCE_POOL_ID.to_string(), pool.to_string());
    labels.insert(crate::adaptors::metal3::LABEL_SITE_ID.to_string(), "site-1".to_string());

    let mut bmh = BareMetalHost::new(
        name,
        BareMetalHostSpec {
            online: true,
            bmc: Some(BmcDetails {
                address: format!("redfish+https://{}.bmc.example.com/redfish/v1/Systems/1", name),
                credentials_name: format!("{}-bmc-secret", name),
                disable_certificate_verification: true,
            }),
            boot_mac_address: "00:00:5e:00:53:01".to_string(),
        },
    );
    bmh.metadata.namespace = Some(BMH_NAMESPACE.to_string());
    bmh.metadata.labels = Some(labels);
    bmh.status = Some(BareMetalHostStatus {
        provisioning: ProvisionStatus { state },
        hardware_details: Some(HardwareDetails {
            ram_mebibytes: 65536,
            system_vendor: SystemVendor {
                manufacturer: "Dell Inc.".to_string(),
                product_name: "PowerEdge R750".to_string(),
                serial_number: format!("SN-{}", name),
            },
            cpu: Cpu {
                arch: "x86_64".to_string(),
                model: "Intel Xeon Gold 6338N".to_string(),
                count: 64,
            },
            nics: vec![Nic {
                name: "eno1".to_string(),
                mac: "00:00:5e:00:53:01".to_string(),
            }],
        }),
        powered_on: true,
    });
    bmh
}

/// Hardware manager resource with LOM credentials and one named NIC port
pub fn hwmgr_resource(id: &str, pool: &str) -> hwmgr_client::Resource {
    let nads = serde_json::json!([
        {
            "model": "E810",
            "name": "nic0",
            "ports": [
                {"mac": "00:00:5e:00:53:20", "Labels": [
                    {"Key": "name", "Value": "ens1f0"},
                    {"Key": "label", "Value": "bootable-interface"}
                ]}
            ]
        }
    ]);
    let mut nics = BTreeMap::new();
    nics.insert("nads".to_string(), nads);
    let mut extensions = BTreeMap::new();
    extensions.insert("O2-nics".to_string(), nics);

    hwmgr_client::Resource {
        id: id.to_string(),
        name: format!("{}.example.com", id),
        resource_pool_id: pool.to_string(),
        vendor: "Dell Inc.".to_string(),
        model: "PowerEdge XR8620t".to_string(),
        serial_number: format!("SN-{}", id),
        memory_mib: 131072,
        resource_attribute: Some(hwmgr_client::ResourceAttribute {
            compute: Some(hwmgr_client::ComputeAttribute {
                lom: Some(hwmgr_client::Lom {
                    ip_address: Some("192.0.2.10".to_string()),
                    password: Some("calvin".to_string()),
                }),
            }),
        }),
        extensions: Some(extensions),
        ..Default::default()
    }
}
