//! peerfleet CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the fleet controller.

pub mod fleet;
pub mod genesis;
pub mod node;

pub use fleet::*;
pub use genesis::*;
pub use node::*;
