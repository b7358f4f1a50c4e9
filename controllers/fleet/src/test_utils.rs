//! Test utilities for unit testing the reconciler
//!
//! Fixture builders for fleets and nodes, well-known keys, and a reconciler
//! wired to an in-memory store.

use crate::client::Images;
use crate::reconciler::Reconciler;
use cluster_store::MockClusterStore;
use crds::{Fleet, FleetSpec, Genesis, ImportedAccount, Node};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::sync::Arc;

/// secp256k1 private key 1; its public key is the curve generator
pub const NODEKEY_ONE: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";
pub const PUBKEY_ONE: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
                              483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8";

/// secp256k1 private key 2
pub const NODEKEY_TWO: &str = "0000000000000000000000000000000000000000000000000000000000000002";
pub const PUBKEY_TWO: &str = "c6047f9441ed7d6d3045406e95c07cd85c778e4b8cef3ca7abac09b95c709ee5\
                              1ae168fea63dc339a3c58419466ceaeef7f632653266d0e1236431a950cfe52a";

/// Helper to create a test Fleet with a uid, so owner references resolve
pub fn create_test_fleet(name: &str, namespace: &str, nodes: Vec<Node>, genesis: Option<Genesis>) -> Fleet {
    let mut fleet = Fleet::new(
        name,
        FleetSpec {
            genesis,
            nodes,
            ..Default::default()
        },
    );
    fleet.metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        uid: Some(format!("uid-{}", name)),
        ..Default::default()
    };
    fleet
}

/// Helper to create a test Node with the same defaults the CRD applies
pub fn create_test_node(name: &str, client: &str) -> Node {
    Node {
        name: name.to_string(),
        client: client.to_string(),
        p2p_port: 30303,
        rpc_port: 8545,
        rpc_api: vec!["web3".to_string(), "net".to_string(), "eth".to_string()],
        ..Default::default()
    }
}

pub fn geth_node(name: &str, bootnode: bool) -> Node {
    Node {
        bootnode,
        ..create_test_node(name, "geth")
    }
}

pub fn besu_node(name: &str, bootnode: bool) -> Node {
    Node {
        bootnode,
        ..create_test_node(name, "besu")
    }
}

/// IPFS node with a peer identity derived from its name
pub fn ipfs_node(name: &str, bootnode: bool) -> Node {
    Node {
        bootnode,
        peer_id: Some(format!("12D3KooW{}", name)),
        private_key: Some(format!("CAESQ{}", name)),
        ..create_test_node(name, "go-ipfs")
    }
}

pub fn imported_account(private_key: &str) -> ImportedAccount {
    ImportedAccount {
        private_key: private_key.to_string(),
        password: "secret".to_string(),
    }
}

/// Helper to create a reconciler sharing state with `store`
pub fn create_test_reconciler(store: &MockClusterStore) -> Reconciler {
    Reconciler::new(Arc::new(store.clone()), Images::default())
}
