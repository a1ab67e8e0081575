//! Prints the provider CRDs as a multi-document YAML stream.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/bases/crds.yaml`

use crds::{NvidiaBMMCluster, NvidiaBMMMachine, NvidiaBMMMachineTemplate};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        NvidiaBMMCluster::crd(),
        NvidiaBMMMachine::crd(),
        NvidiaBMMMachineTemplate::crd(),
    ];
    for crd in crds {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
