//! go-ipfs strategy
//!
//! IPFS nodes have no genesis. Their repo is initialized by an `init-node`
//! container, then bootstrap peers and configuration profiles are applied by
//! one init container each.
//!
//! `init-node` pins the configured identity: `peerId` comes from the
//! environment and the private key from the mounted node Secret, and both
//! are written into the repo config on every start.

use super::{ClientStrategy, IPFS_PRIVATE_KEY_FILE, PATH_SECRETS, service_port, strings};
use crate::error::ControllerError;
use crds::{FleetSpec, Node, VerbosityLevel};
use k8s_openapi::api::core::v1::{Container, EnvVar, ServicePort, VolumeMount};

const PATH_DATA: &str = "/data/ipfs";

pub const SWARM_PORT: u16 = 4001;
pub const SWARM_UDP_PORT: u16 = 4002;
pub const API_PORT: u16 = 5001;
pub const GATEWAY_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct GoIpfs {
    image: String,
}

impl GoIpfs {
    pub fn new(image: String) -> Self {
        Self { image }
    }

    fn init_container(&self, name: String, command: Vec<String>, args: Vec<String>, mounts: &[VolumeMount]) -> Container {
        Container {
            name,
            image: Some(self.image.clone()),
            command: Some(command),
            args: Some(args),
            volume_mounts: Some(mounts.to_vec()),
            ..Default::default()
        }
    }
}

/// Initialize the repo once, then overwrite its identity with the configured one.
fn init_node_script() -> String {
    format!(
        r#"set -e

if [ ! -f {data}/config ]
then
    ipfs init
fi

if [ -n "$IPFS_PEER_ID" ] && [ -f {secrets}/{key} ]
then
    key=$(cat {secrets}/{key})
    sed -i \
        -e "s|\"PeerID\": \"[^\"]*\"|\"PeerID\": \"$IPFS_PEER_ID\"|" \
        -e "s|\"PrivKey\": \"[^\"]*\"|\"PrivKey\": \"$key\"|" \
        {data}/config
fi
"#,
        data = PATH_DATA,
        secrets = PATH_SECRETS,
        key = IPFS_PRIVATE_KEY_FILE,
    )
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

impl ClientStrategy for GoIpfs {
    fn name(&self) -> &'static str {
        "go-ipfs"
    }

    fn image(&self) -> &str {
        &self.image
    }

    fn command(&self) -> Vec<String> {
        strings(&["ipfs"])
    }

    fn args(&self, _fleet: &FleetSpec, _node: &Node, _peers: &[String]) -> Vec<String> {
        strings(&["daemon"])
    }

    fn env(&self, node: &Node) -> Vec<EnvVar> {
        vec![env("GOLOG_LOG_LEVEL", &self.logging_flag(node.logging))]
    }

    fn logging_flag(&self, level: VerbosityLevel) -> String {
        match level {
            VerbosityLevel::Off | VerbosityLevel::Fatal => "fatal",
            VerbosityLevel::Error => "error",
            VerbosityLevel::Warn => "warn",
            VerbosityLevel::Info => "info",
            VerbosityLevel::Debug | VerbosityLevel::Trace | VerbosityLevel::All => "debug",
        }
        .to_string()
    }

    fn data_path(&self) -> &'static str {
        PATH_DATA
    }

    fn service_ports(&self, _node: &Node) -> Vec<ServicePort> {
        vec![
            service_port("swarm", SWARM_PORT, "TCP"),
            service_port("swarm-udp", SWARM_UDP_PORT, "UDP"),
            service_port("api", API_PORT, "TCP"),
            service_port("gateway", GATEWAY_PORT, "TCP"),
        ]
    }

    fn post_init_containers(&self, node: &Node, peers: &[String], mounts: &[VolumeMount]) -> Vec<Container> {
        let mut containers = Vec::with_capacity(1 + peers.len() + node.profiles.len());

        let mut init_node = self.init_container(
            "init-node".to_string(),
            strings(&["/bin/sh", "-c"]),
            vec![init_node_script()],
            mounts,
        );
        if let Some(peer_id) = &node.peer_id {
            init_node.env = Some(vec![env("IPFS_PEER_ID", peer_id)]);
        }
        containers.push(init_node);

        for (i, peer) in peers.iter().enumerate() {
            containers.push(self.init_container(
                format!("add-bootstrap-peer-{}", i),
                strings(&["ipfs"]),
                vec!["bootstrap".into(), "add".into(), peer.clone()],
                mounts,
            ));
        }

        for profile in &node.profiles {
            containers.push(self.init_container(
                format!("apply-{}-profile", profile),
                strings(&["ipfs"]),
                vec!["config".into(), "profile".into(), "apply".into(), profile.clone()],
                mounts,
            ));
        }

        containers
    }

    /// The configured `peerId`. A node without a private key runs under a
    /// generated identity, so its `peerId` cannot be trusted.
    fn public_identity(&self, node: &Node) -> Result<String, ControllerError> {
        let peer_id = node
            .peer_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                ControllerError::UnresolvedPeerAddress(format!("ipfs node {} has no peerId", node.name))
            })?;
        if node.private_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            return Err(ControllerError::UnresolvedPeerAddress(format!(
                "ipfs node {} has no private key to pin peerId {}",
                node.name, peer_id
            )));
        }
        Ok(peer_id)
    }

    fn peer_address(&self, identity: &str, ip: &str, _node: &Node) -> String {
        format!("/ip4/{}/tcp/{}/p2p/{}", ip, SWARM_PORT, identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipfs() -> GoIpfs {
        GoIpfs::new("ipfs/go-ipfs:test".to_string())
    }

    fn node() -> Node {
        Node {
            name: "peer-0".into(),
            client: "go-ipfs".into(),
            peer_id: Some("12D3KooWPeer".into()),
            private_key: Some("CAESQ...".into()),
            profiles: vec!["server".into(), "lowpower".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_post_init_container_order() {
        let peers = vec!["/ip4/10.0.0.1/tcp/4001/p2p/a".to_string(), "/ip4/10.0.0.2/tcp/4001/p2p/b".to_string()];
        let names: Vec<String> = ipfs()
            .post_init_containers(&node(), &peers, &[])
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "init-node",
                "add-bootstrap-peer-0",
                "add-bootstrap-peer-1",
                "apply-server-profile",
                "apply-lowpower-profile",
            ]
        );
    }

    #[test]
    fn test_init_node_env_and_bootstrap_args() {
        let peers = vec!["/ip4/10.0.0.1/tcp/4001/p2p/a".to_string()];
        let containers = ipfs().post_init_containers(&node(), &peers, &[]);

        let env = containers[0].env.clone().unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env[0].name, "IPFS_PEER_ID");
        assert_eq!(env[0].value.as_deref(), Some("12D3KooWPeer"));

        assert_eq!(
            containers[1].args.clone().unwrap(),
            vec!["bootstrap", "add", "/ip4/10.0.0.1/tcp/4001/p2p/a"]
        );
    }

    #[test]
    fn test_identity_and_address() {
        let strategy = ipfs();
        let identity = strategy.public_identity(&node()).unwrap();
        assert_eq!(
            strategy.peer_address(&identity, "10.96.0.7", &node()),
            "/ip4/10.96.0.7/tcp/4001/p2p/12D3KooWPeer"
        );

        let mut anonymous = node();
        anonymous.peer_id = None;
        assert!(matches!(
            strategy.public_identity(&anonymous),
            Err(ControllerError::UnresolvedPeerAddress(_))
        ));

        let mut unpinned = node();
        unpinned.private_key = None;
        assert!(matches!(
            strategy.public_identity(&unpinned),
            Err(ControllerError::UnresolvedPeerAddress(_))
        ));
    }

    #[test]
    fn test_init_node_pins_identity_from_secret() {
        let containers = ipfs().post_init_containers(&node(), &[], &[]);
        let args = containers[0].args.clone().unwrap();
        let script = &args[0];

        assert!(script.contains("if [ ! -f /data/ipfs/config ]"));
        assert!(script.contains("key=$(cat /mnt/secrets/ipfs.key)"));
        assert!(script.contains(r#"|\"PeerID\": \"$IPFS_PEER_ID\"|"#));
        assert!(script.contains(r#"|\"PrivKey\": \"$key\"|"#));
        // the key itself never appears in the pod spec
        assert!(!script.contains("CAESQ"));
    }

    #[test]
    fn test_no_genesis() {
        assert!(!ipfs().renders_genesis());
        assert!(ipfs().init_genesis_script().is_none());
        assert!(ipfs().import_account_script().is_none());
    }

    #[test]
    fn test_service_ports() {
        let ports = ipfs().service_ports(&node());
        let names: Vec<_> = ports.iter().filter_map(|p| p.name.as_deref()).collect();
        assert_eq!(names, vec!["swarm", "swarm-udp", "api", "gateway"]);
    }
}
