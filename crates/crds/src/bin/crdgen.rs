//! Prints the CustomResourceDefinitions owned by the load-balancer controller.
//!
//! Usage: `cargo run -p crds --bin crdgen > deploy/crds.yaml`

use crds::{TransportServer, VirtualServer, IPAM};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        VirtualServer::crd(),
        TransportServer::crd(),
        IPAM::crd(),
    ];
    for crd in crds {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
