//! Prints the Fleet CRD manifest as YAML.
//!
//! Usage: `cargo run -p crds --bin crdgen > deploy/crd.yaml`

use crds::Fleet;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Fleet::crd())?);
    Ok(())
}
