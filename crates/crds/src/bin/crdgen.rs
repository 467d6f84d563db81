//! Prints the CRD manifests owned by the plugin as a multi-document YAML stream.
//!
//! BareMetalHost is owned by metal3 and is not emitted.

use crds::{HardwareManager, HardwareProfile, Node, NodePool};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        NodePool::crd(),
        Node::crd(),
        HardwareManager::crd(),
        HardwareProfile::crd(),
    ];

    for crd in crds {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }

    Ok(())
}
