//! Cluster — the aggregate of nodes, network, LB and registries (§3).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::network::ClusterNetwork;
use super::node::Node;
use super::role::Role;

const MAX_NAME_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClusterNameError {
    #[error("cluster name {0:?} is longer than {MAX_NAME_LEN} characters")]
    TooLong(String),
    #[error("cluster name {0:?} is not a valid DNS label")]
    NotDnsLabel(String),
}

/// Validate a cluster name against the DNS-label rule in §3:
/// `[a-z0-9]([-a-z0-9]*[a-z0-9])?`, at most 32 characters.
pub fn validate_cluster_name(name: &str) -> Result<(), ClusterNameError> {
    if name.len() > MAX_NAME_LEN {
        return Err(ClusterNameError::TooLong(name.to_string()));
    }
    let bytes = name.as_bytes();
    let is_label_char = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let valid = !bytes.is_empty()
        && is_label_char(bytes[0])
        && is_label_char(*bytes.last().unwrap())
        && bytes
            .iter()
            .all(|&b| is_label_char(b) || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(ClusterNameError::NotDnsLabel(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeApi {
    pub host: String,
    pub host_ip: String,
    pub host_port: u16,
    pub container_port: u16,
}

impl Default for KubeApi {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            host_ip: "0.0.0.0".to_string(),
            host_port: 6443,
            container_port: 6443,
        }
    }
}

/// Invariant violations checked at Plan time and re-verified whenever the
/// aggregate is reconstructed from labels (§8 invariant 7).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClusterInvariantError {
    #[error("cluster has {servers} server(s) but no InitNode is designated")]
    MissingInitNode { servers: usize },
    #[error("cluster has a single server but an InitNode {0:?} is designated")]
    SpuriousInitNode(String),
    #[error("InitNode {0:?} does not refer to any node in the cluster")]
    DanglingInitNode(String),
    #[error("node {0:?} is not attached to the cluster's primary network {1:?}")]
    NodeNotOnPrimaryNetwork(String, String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub nodes: Vec<Node>,
    /// Back-reference by name, not by pointer — no cycles in the object
    /// graph (Design Notes).
    pub init_node: Option<String>,
    pub server_load_balancer: Option<String>,
    pub network: ClusterNetwork,
    pub token: String,
    pub kube_api: KubeApi,
    pub image_volume: Option<String>,
}

impl Cluster {
    pub fn servers(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.role == Role::Server)
    }

    pub fn agents(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.role == Role::Agent)
    }

    pub fn load_balancer(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.role == Role::LoadBalancer)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Verify §3/§8 invariant 7: an InitNode is designated iff servers > 1.
    pub fn check_invariants(&self) -> Result<(), ClusterInvariantError> {
        let server_count = self.servers().count();
        match (&self.init_node, server_count) {
            (None, n) if n > 1 => {
                return Err(ClusterInvariantError::MissingInitNode { servers: n })
            }
            (Some(name), n) if n <= 1 => {
                return Err(ClusterInvariantError::SpuriousInitNode(name.clone()))
            }
            _ => {}
        }
        if let Some(name) = &self.init_node {
            if self.node(name).is_none() {
                return Err(ClusterInvariantError::DanglingInitNode(name.clone()));
            }
        }
        for node in &self.nodes {
            if node.primary_network().is_none() && node.role != Role::Registry {
                return Err(ClusterInvariantError::NodeNotOnPrimaryNetwork(
                    node.name.clone(),
                    self.network.name.clone(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_dns_labels() {
        assert!(validate_cluster_name("demo").is_ok());
        assert!(validate_cluster_name("demo-1").is_ok());
        assert!(validate_cluster_name("a").is_ok());
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(validate_cluster_name("Demo").is_err());
        assert!(validate_cluster_name("-demo").is_err());
        assert!(validate_cluster_name("demo-").is_err());
        assert!(validate_cluster_name("").is_err());
        assert!(validate_cluster_name(&"a".repeat(33)).is_err());
    }

    fn bare_cluster() -> Cluster {
        Cluster {
            name: "demo".into(),
            nodes: vec![],
            init_node: None,
            server_load_balancer: None,
            network: ClusterNetwork::owned("demo", "172.20.0.0/16".parse().unwrap()),
            token: "tok".into(),
            kube_api: KubeApi::default(),
            image_volume: None,
        }
    }

    #[test]
    fn single_server_needs_no_init_node() {
        let mut c = bare_cluster();
        let mut n = Node::new("demo-server-0", Role::Server);
        n.networks.push(super::super::node::NetworkAttachment {
            name: "demo".into(),
            primary: true,
        });
        c.nodes.push(n);
        assert!(c.check_invariants().is_ok());
    }

    #[test]
    fn ha_cluster_without_init_node_is_invalid() {
        let mut c = bare_cluster();
        for i in 0..3 {
            let mut n = Node::new(format!("demo-server-{i}"), Role::Server);
            n.networks.push(super::super::node::NetworkAttachment {
                name: "demo".into(),
                primary: true,
            });
            c.nodes.push(n);
        }
        assert_eq!(
            c.check_invariants(),
            Err(ClusterInvariantError::MissingInitNode { servers: 3 })
        );
    }
}
