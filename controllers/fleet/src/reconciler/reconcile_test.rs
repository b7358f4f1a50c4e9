//! End-to-end reconciliation tests against the in-memory store

#[cfg(test)]
mod tests {
    use crate::error::ControllerError;
    use crate::test_utils::*;
    use cluster_store::{ChildResource, MockClusterStore, Mutation, ResourceKind, StoreError, StoreOp};
    use crds::{Genesis, Node};
    use k8s_openapi::api::core::v1::{Service, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeSet;

    const NS: &str = "chains";

    fn seed(store: &MockClusterStore, nodes: Vec<Node>, genesis: Option<Genesis>) {
        store.insert_fleet(create_test_fleet("demo", NS, nodes, genesis));
    }

    /// Replace the stored fleet spec, keeping the status the controller wrote
    fn update_nodes(store: &MockClusterStore, nodes: Vec<Node>) {
        let mut fleet = create_test_fleet("demo", NS, nodes, None);
        fleet.status = store.fleet_status(NS, "demo");
        store.insert_fleet(fleet);
    }

    fn node_args(store: &MockClusterStore, name: &str) -> Vec<String> {
        match store.object(ResourceKind::Workload, NS, name) {
            Some(ChildResource::Workload(deployment)) => deployment
                .spec
                .and_then(|s| s.template.spec)
                .map(|pod| pod.containers[0].args.clone().unwrap_or_default())
                .unwrap_or_default(),
            other => panic!("no deployment {}: {:?}", name, other),
        }
    }

    fn bootnodes(args: &[String]) -> Option<String> {
        args.iter()
            .position(|a| a == "--bootnodes")
            .and_then(|i| args.get(i + 1))
            .cloned()
    }

    fn enode(public_key: &str, ip: &str) -> String {
        format!("enode://{}@{}:30303", public_key, ip)
    }

    fn deleted(store: &MockClusterStore) -> BTreeSet<(ResourceKind, String)> {
        store
            .mutations()
            .into_iter()
            .filter_map(|m| match m {
                Mutation::Deleted(kind, name) => Some((kind, name)),
                _ => None,
            })
            .collect()
    }

    fn writes(store: &MockClusterStore) -> Vec<Mutation> {
        store
            .mutations()
            .into_iter()
            .filter(|m| matches!(m, Mutation::Created(..) | Mutation::Replaced(..)))
            .collect()
    }

    fn three_node_fleet() -> Vec<Node> {
        let mut n0 = geth_node("n0", true);
        n0.nodekey = Some(NODEKEY_ONE.to_string());
        let mut n1 = geth_node("n1", true);
        n1.nodekey = Some(NODEKEY_TWO.to_string());
        let n2 = geth_node("n2", false);
        vec![n0, n1, n2]
    }

    #[tokio::test]
    async fn test_second_pass_makes_no_writes() {
        let store = MockClusterStore::new();
        let mut nodes = three_node_fleet();
        nodes[2].import = Some(imported_account(NODEKEY_TWO));
        nodes[2].miner = true;
        nodes[2].coinbase = Some("0x8e1c6a7b4f0b6d0e0f5b3a1c2d3e4f5a6b7c8d9e".to_string());
        seed(&store, nodes, Some(Genesis::with_chain_id(4444)));
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile(NS, "demo").await.unwrap();
        let first = store.mutations();
        assert!(!first.is_empty());
        assert_eq!(
            first
                .iter()
                .filter(|m| matches!(m, Mutation::FleetStatusPatched(_)))
                .count(),
            1
        );
        assert_eq!(store.fleet_status(NS, "demo").map(|s| s.nodes_count), Some(3));

        store.clear_mutations();
        reconciler.reconcile(NS, "demo").await.unwrap();
        assert_eq!(store.mutations(), Vec::<Mutation>::new());
    }

    #[tokio::test]
    async fn test_bootnodes_only_reach_later_nodes() {
        let store = MockClusterStore::new();
        seed(&store, three_node_fleet(), None);
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile(NS, "demo").await.unwrap();

        // services are created in node order, so n0 gets the first cluster IP
        let first = enode(PUBKEY_ONE, "10.96.0.2");
        let second = enode(PUBKEY_TWO, "10.96.0.3");

        assert_eq!(bootnodes(&node_args(&store, "demo-n0")), None);
        assert_eq!(bootnodes(&node_args(&store, "demo-n1")), Some(first.clone()));
        assert_eq!(
            bootnodes(&node_args(&store, "demo-n2")),
            Some(format!("{},{}", first, second))
        );

        assert_eq!(
            store.names(ResourceKind::Endpoint, NS),
            vec!["demo-n0".to_string(), "demo-n1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_promoted_bootnode_updates_later_nodes() {
        let store = MockClusterStore::new();
        let mut nodes = three_node_fleet();
        nodes[1].bootnode = false;
        nodes[1].nodekey = None;
        seed(&store, nodes.clone(), None);
        let reconciler = create_test_reconciler(&store);
        reconciler.reconcile(NS, "demo").await.unwrap();
        assert_eq!(bootnodes(&node_args(&store, "demo-n1")), Some(enode(PUBKEY_ONE, "10.96.0.2")));

        nodes[1].bootnode = true;
        nodes[1].nodekey = Some(NODEKEY_TWO.to_string());
        update_nodes(&store, nodes);
        store.clear_mutations();
        reconciler.reconcile(NS, "demo").await.unwrap();

        assert_eq!(
            bootnodes(&node_args(&store, "demo-n2")),
            Some(format!("{},{}", enode(PUBKEY_ONE, "10.96.0.2"), enode(PUBKEY_TWO, "10.96.0.3")))
        );
        // n0 precedes every change and is not rewritten
        assert!(
            !writes(&store)
                .iter()
                .any(|m| matches!(m, Mutation::Replaced(_, name) if name == "demo-n0"))
        );
    }

    #[tokio::test]
    async fn test_shrinking_deletes_exactly_removed_nodes() {
        let store = MockClusterStore::new();
        let nodes = three_node_fleet();
        seed(&store, nodes.clone(), None);
        let reconciler = create_test_reconciler(&store);
        reconciler.reconcile(NS, "demo").await.unwrap();

        update_nodes(&store, vec![nodes[0].clone()]);
        store.clear_mutations();
        reconciler.reconcile(NS, "demo").await.unwrap();

        let expected: BTreeSet<(ResourceKind, String)> = [
            (ResourceKind::Volume, "demo-n1"),
            (ResourceKind::Secret, "demo-n1"),
            (ResourceKind::Endpoint, "demo-n1"),
            (ResourceKind::Workload, "demo-n1"),
            (ResourceKind::Volume, "demo-n2"),
            (ResourceKind::Workload, "demo-n2"),
        ]
        .into_iter()
        .map(|(k, n)| (k, n.to_string()))
        .collect();
        assert_eq!(deleted(&store), expected);
        assert_eq!(writes(&store), Vec::<Mutation>::new());

        for kind in [ResourceKind::Volume, ResourceKind::Secret, ResourceKind::Endpoint, ResourceKind::Workload] {
            assert_eq!(store.names(kind, NS), vec!["demo-n0".to_string()], "{}", kind);
        }
    }

    #[tokio::test]
    async fn test_shrinking_genesis_fleet_deletes_node_configs() {
        let store = MockClusterStore::new();
        let mut nodes = three_node_fleet();
        nodes[2].import = Some(imported_account(NODEKEY_TWO));
        let genesis = Some(Genesis::with_chain_id(4444));
        seed(&store, nodes.clone(), genesis.clone());
        let reconciler = create_test_reconciler(&store);
        reconciler.reconcile(NS, "demo").await.unwrap();
        assert_eq!(
            store.names(ResourceKind::Config, NS),
            vec!["demo-n0-geth", "demo-n1-geth", "demo-n2-geth"]
        );

        let mut fleet = create_test_fleet("demo", NS, vec![nodes[0].clone()], genesis);
        fleet.status = store.fleet_status(NS, "demo");
        store.insert_fleet(fleet);
        store.clear_mutations();
        reconciler.reconcile(NS, "demo").await.unwrap();

        let expected: BTreeSet<(ResourceKind, String)> = [
            (ResourceKind::Volume, "demo-n1"),
            (ResourceKind::Config, "demo-n1-geth"),
            (ResourceKind::Secret, "demo-n1"),
            (ResourceKind::Endpoint, "demo-n1"),
            (ResourceKind::Workload, "demo-n1"),
            (ResourceKind::Volume, "demo-n2"),
            (ResourceKind::Config, "demo-n2-geth"),
            (ResourceKind::Secret, "demo-n2"),
            (ResourceKind::Workload, "demo-n2"),
        ]
        .into_iter()
        .map(|(k, n)| (k, n.to_string()))
        .collect();
        assert_eq!(deleted(&store), expected);
        assert_eq!(writes(&store), Vec::<Mutation>::new());
        assert_eq!(store.names(ResourceKind::Config, NS), vec!["demo-n0-geth"]);
        assert_eq!(store.names(ResourceKind::Secret, NS), vec!["demo-n0"]);
    }

    #[tokio::test]
    async fn test_canonicalized_quantities_do_not_trigger_writes() {
        let store = MockClusterStore::new();
        let mut node = geth_node("n0", false);
        node.resources.cpu = "2000m".to_string();
        node.resources.memory = "4096Mi".to_string();
        seed(&store, vec![node], None);
        let reconciler = create_test_reconciler(&store);
        reconciler.reconcile(NS, "demo").await.unwrap();

        // the API server stores quantities in canonical form
        let Some(ChildResource::Workload(mut deployment)) = store.object(ResourceKind::Workload, NS, "demo-n0") else {
            panic!("no deployment demo-n0");
        };
        let pod = deployment.spec.as_mut().and_then(|s| s.template.spec.as_mut()).unwrap();
        for container in pod.containers.iter_mut().chain(pod.init_containers.iter_mut().flatten()) {
            for quantity in container
                .resources
                .iter_mut()
                .filter_map(|r| r.requests.as_mut())
                .flat_map(|requests| requests.values_mut())
            {
                match quantity.0.as_str() {
                    "2000m" => quantity.0 = "2".to_string(),
                    "4096Mi" => quantity.0 = "4Gi".to_string(),
                    _ => {}
                }
            }
        }
        store.insert(NS, ChildResource::Workload(deployment));

        store.clear_mutations();
        reconciler.reconcile(NS, "demo").await.unwrap();
        assert_eq!(store.mutations(), Vec::<Mutation>::new());
    }

    #[tokio::test]
    async fn test_colliding_names_across_fleets_are_rejected() {
        let store = MockClusterStore::new();
        // "a-b" + "c" and "a" + "b-c" both name their node objects "a-b-c"
        store.insert_fleet(create_test_fleet("a-b", NS, vec![geth_node("c", false)], None));
        store.insert_fleet(create_test_fleet("a", NS, vec![geth_node("b-c", false)], None));
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile(NS, "a-b").await.unwrap();
        store.clear_mutations();
        let err = reconciler.reconcile(NS, "a").await.unwrap_err();
        assert!(
            matches!(&err, ControllerError::Store(StoreError::Conflict(m)) if m.contains("Fleet a-b")),
            "unexpected {:?}",
            err
        );
        assert!(writes(&store).is_empty());

        for kind in [ResourceKind::Volume, ResourceKind::Workload] {
            let object = store.object(kind, NS, "a-b-c").unwrap();
            let owners = object.metadata().owner_references.clone().unwrap();
            assert_eq!(owners.len(), 1, "{}", kind);
            assert_eq!(owners[0].uid, "uid-a-b", "{}", kind);
        }
    }

    #[tokio::test]
    async fn test_volume_size_is_fixed_after_creation() {
        let store = MockClusterStore::new();
        let mut nodes = vec![geth_node("n0", false)];
        seed(&store, nodes.clone(), None);
        let reconciler = create_test_reconciler(&store);
        reconciler.reconcile(NS, "demo").await.unwrap();

        nodes[0].resources.storage = "500Gi".to_string();
        nodes[0].resources.memory = "8Gi".to_string();
        update_nodes(&store, nodes);
        store.clear_mutations();
        reconciler.reconcile(NS, "demo").await.unwrap();

        match store.object(ResourceKind::Volume, NS, "demo-n0") {
            Some(ChildResource::Volume(pvc)) => {
                let requests = pvc.spec.and_then(|s| s.resources).and_then(|r| r.requests).unwrap();
                assert_eq!(requests["storage"].0, "100Gi");
            }
            other => panic!("unexpected {:?}", other),
        }
        // the workload still follows the fleet spec
        assert_eq!(
            writes(&store),
            vec![Mutation::Replaced(ResourceKind::Workload, "demo-n0".to_string())]
        );
    }

    #[tokio::test]
    async fn test_malformed_key_creates_nothing_for_the_node() {
        let store = MockClusterStore::new();
        let mut node = geth_node("n0", false);
        node.nodekey = Some("0xnot-a-key".to_string());
        seed(&store, vec![node], None);
        let reconciler = create_test_reconciler(&store);

        let err = reconciler.reconcile(NS, "demo").await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidKeyMaterial(_)));
        assert!(store.names(ResourceKind::Secret, NS).is_empty());
        assert_eq!(store.object_count(), 0);
    }

    #[tokio::test]
    async fn test_gc_failures_are_isolated_per_kind() {
        let store = MockClusterStore::new();
        let nodes = three_node_fleet();
        seed(&store, nodes.clone(), None);
        let reconciler = create_test_reconciler(&store);
        reconciler.reconcile(NS, "demo").await.unwrap();

        update_nodes(&store, vec![nodes[0].clone(), nodes[2].clone()]);
        store.fail_on(StoreOp::Delete, ResourceKind::Secret, "etcd is sad");
        let err = reconciler.reconcile(NS, "demo").await.unwrap_err();
        assert!(matches!(err, ControllerError::GarbageCollection(ref m) if m.contains("etcd is sad")));

        // the other kinds were still collected
        assert_eq!(store.names(ResourceKind::Workload, NS), vec!["demo-n0", "demo-n2"]);
        assert_eq!(store.names(ResourceKind::Endpoint, NS), vec!["demo-n0"]);
        assert_eq!(store.names(ResourceKind::Secret, NS), vec!["demo-n0", "demo-n1"]);

        store.clear_failure(StoreOp::Delete, ResourceKind::Secret);
        reconciler.reconcile(NS, "demo").await.unwrap();
        assert_eq!(store.names(ResourceKind::Secret, NS), vec!["demo-n0"]);
    }

    #[tokio::test]
    async fn test_store_failure_aborts_the_pass() {
        let store = MockClusterStore::new();
        seed(&store, three_node_fleet(), None);
        store.fail_on(StoreOp::Create, ResourceKind::Endpoint, "quota exceeded");
        let reconciler = create_test_reconciler(&store);

        let err = reconciler.reconcile(NS, "demo").await.unwrap_err();
        assert!(matches!(err, ControllerError::Store(_)));
        // n0 stopped at its service; later nodes were never touched
        assert_eq!(store.names(ResourceKind::Workload, NS), Vec::<String>::new());
        assert_eq!(store.names(ResourceKind::Volume, NS), vec!["demo-n0"]);
    }

    #[tokio::test]
    async fn test_headless_bootnode_is_unresolved() {
        let store = MockClusterStore::new();
        seed(&store, three_node_fleet(), None);
        store.insert(
            NS,
            ChildResource::Endpoint(Service {
                metadata: ObjectMeta {
                    name: Some("demo-n0".to_string()),
                    ..Default::default()
                },
                spec: Some(ServiceSpec {
                    cluster_ip: Some("None".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        );
        let reconciler = create_test_reconciler(&store);

        let err = reconciler.reconcile(NS, "demo").await.unwrap_err();
        assert!(matches!(err, ControllerError::UnresolvedPeerAddress(_)));
        assert!(store.object(ResourceKind::Workload, NS, "demo-n1").is_none());
    }

    #[tokio::test]
    async fn test_missing_fleet_is_a_no_op() {
        let store = MockClusterStore::new();
        let reconciler = create_test_reconciler(&store);

        reconciler.reconcile(NS, "ghost").await.unwrap();
        assert!(store.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_children_are_owned_by_the_fleet() {
        let store = MockClusterStore::new();
        seed(&store, three_node_fleet(), None);
        let reconciler = create_test_reconciler(&store);
        reconciler.reconcile(NS, "demo").await.unwrap();

        let secret = store.object(ResourceKind::Secret, NS, "demo-n1").unwrap();
        let owners = secret.metadata().owner_references.clone().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].uid, "uid-demo");
        assert_eq!(owners[0].kind, "Fleet");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[tokio::test]
    async fn test_ipfs_swarm_bootstrap() {
        let store = MockClusterStore::new();
        let mut p0 = ipfs_node("p0", true);
        p0.profiles = vec!["server".to_string()];
        let p1 = ipfs_node("p1", false);
        seed(&store, vec![p0, p1], None);
        let reconciler = create_test_reconciler(&store);
        reconciler.reconcile(NS, "demo").await.unwrap();

        let pod = match store.object(ResourceKind::Workload, NS, "demo-p1") {
            Some(ChildResource::Workload(d)) => d.spec.and_then(|s| s.template.spec).unwrap(),
            other => panic!("unexpected {:?}", other),
        };
        let init = pod.init_containers.unwrap();
        assert_eq!(init[0].name, "init-node");
        assert_eq!(init[1].name, "add-bootstrap-peer-0");
        assert_eq!(
            init[1].args.clone().unwrap(),
            vec!["bootstrap", "add", "/ip4/10.96.0.2/tcp/4001/p2p/12D3KooWp0"]
        );
        assert!(store.names(ResourceKind::Config, NS).is_empty());
        assert_eq!(store.names(ResourceKind::Secret, NS), vec!["demo-p0", "demo-p1"]);
        let key = match store.object(ResourceKind::Secret, NS, "demo-p1") {
            Some(ChildResource::Secret(secret)) => secret.data.unwrap()["ipfs.key"].0.clone(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(key, b"CAESQp1");
        assert!(init.iter().all(|c| {
            c.env
                .iter()
                .flatten()
                .all(|var| var.value.as_deref().is_none_or(|v| !v.contains("CAESQ")))
        }));

        store.clear_mutations();
        reconciler.reconcile(NS, "demo").await.unwrap();
        assert!(store.mutations().is_empty());
    }

    #[test]
    fn test_backoff_is_tracked_per_fleet() {
        let reconciler = create_test_reconciler(&MockClusterStore::new());
        reconciler.increment_error("chains/a");
        assert_eq!(reconciler.get_backoff_for_resource("chains/a"), (5, 1));
        reconciler.increment_error("chains/a");
        assert_eq!(reconciler.get_backoff_for_resource("chains/a"), (5, 2));
        assert_eq!(reconciler.get_backoff_for_resource("chains/a"), (10, 2));
        assert_eq!(reconciler.get_backoff_for_resource("chains/b"), (5, 0));

        reconciler.reset_error("chains/a");
        assert_eq!(reconciler.get_backoff_for_resource("chains/a"), (5, 0));
    }
}
