//! Translation of hardware manager resources into Node data.

use crate::adaptors::AdaptorError;
use crds::{Bmc, Interface};
use hwmgr_client::{Lom, Resource};
use serde::Deserialize;

pub const IDRAC_URL_PREFIX: &str = "idrac-virtualmedia+https://";
// TODO: use the full BMC URL once the hardware manager returns one
pub const IDRAC_URL_SUFFIX: &str = "/redfish/v1/Systems/System.Embedded.1";

pub const EXTENSIONS_NICS: &str = "O2-nics";
pub const EXTENSIONS_NADS: &str = "nads";

const LABEL_NAME_KEY: &str = "name";
const LABEL_LABEL_KEY: &str = "label";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
struct ExtensionLabel {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value")]
    value: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
struct ExtensionPort {
    #[serde(default)]
    mac: String,
    #[serde(default, rename = "Labels")]
    labels: Vec<ExtensionLabel>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
struct ExtensionInterface {
    #[serde(default)]
    ports: Vec<ExtensionPort>,
}

fn invalid(resource: &Resource, message: &str) -> AdaptorError {
    AdaptorError::InvalidResource(format!("resource {}: {}", resource.id, message))
}

fn parse_extension_interfaces(resource: &Resource) -> Result<Vec<ExtensionInterface>, AdaptorError> {
    let extensions = resource
        .extensions
        .as_ref()
        .ok_or_else(|| invalid(resource, "missing required extensions field"))?;
    let nics = extensions
        .get(EXTENSIONS_NICS)
        .ok_or_else(|| invalid(resource, "missing required extensions nics field"))?;
    let nads = nics
        .get(EXTENSIONS_NADS)
        .ok_or_else(|| invalid(resource, "missing required extensions nads field"))?;

    serde_json::from_value(nads.clone()).map_err(|_| invalid(resource, "invalid nic data format"))
}

/// Lights-out management details, required for every allocated resource
fn lom(resource: &Resource) -> Option<(&str, &str)> {
    let Lom { ip_address, password, .. } = resource.resource_attribute.as_ref()?.compute.as_ref()?.lom.as_ref()?;
    Some((ip_address.as_deref()?, password.as_deref()?))
}

/// Checks that a resource carries everything needed to build its Node.
pub fn validate_resource(resource: &Resource) -> Result<(), AdaptorError> {
    if lom(resource).is_none() {
        return Err(invalid(resource, "missing required resource attribute field"));
    }
    parse_extension_interfaces(resource)?;
    Ok(())
}

/// Node interfaces from the NIC extension. Ports without a name label are
/// skipped.
pub fn node_interfaces(resource: &Resource) -> Result<Vec<Interface>, AdaptorError> {
    let mut interfaces = Vec::new();
    for nic in parse_extension_interfaces(resource)? {
        for port in nic.ports {
            let mut interface = Interface {
                mac_address: port.mac,
                ..Default::default()
            };
            for label in port.labels {
                match label.key.as_str() {
                    LABEL_NAME_KEY => interface.name = label.value,
                    LABEL_LABEL_KEY => interface.label = label.value,
                    _ => {}
                }
            }
            if interface.name.is_empty() {
                continue;
            }
            interfaces.push(interface);
        }
    }
    Ok(interfaces)
}

/// BMC of a resource with the credentials Secret it will be stored in
pub fn node_bmc(resource: &Resource, credentials_name: &str) -> Result<Bmc, AdaptorError> {
    let (ip, _) = lom(resource).ok_or_else(|| invalid(resource, "missing required resource attribute field"))?;
    Ok(Bmc {
        address: format!("{}{}{}", IDRAC_URL_PREFIX, ip, IDRAC_URL_SUFFIX),
        credentials_name: credentials_name.to_string(),
    })
}

/// BMC password of a resource
pub fn bmc_password(resource: &Resource) -> Result<&str, AdaptorError> {
    lom(resource)
        .map(|(_, password)| password)
        .ok_or_else(|| invalid(resource, "missing required resource attribute field"))
}
