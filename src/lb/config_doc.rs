//! Pure synthesis of the load-balancer's config document (§4.4, §8:
//! "LB synthesis purity" — same server membership and ports always produce
//! the same bytes, regardless of call order or prior state).

use serde::{Deserialize, Serialize};

use crate::domain::cluster::Cluster;
use crate::domain::node::Protocol;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backend {
    pub node: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bind {
    pub listen_port: u16,
    pub protocol: Protocol,
    pub backends: Vec<Backend>,
}

/// The full document written to `/etc/confd/values.yaml` (or equivalent)
/// inside the `serverlb` container and picked up by its reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbConfigDoc {
    pub binds: Vec<Bind>,
}

impl LbConfigDoc {
    /// Canonical byte representation used both to write the document and
    /// to detect whether an update actually changes anything.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_yaml::to_string(self)
            .expect("LbConfigDoc serializes infallibly")
            .into_bytes()
    }
}

/// The trailing `-<n>` node-name suffix assigned during transform
/// (`<cluster>-server-<i>`), used to order backends by server index rather
/// than lexicographically — plain string sort would put `server-10` before
/// `server-2`.
fn server_index(name: &str) -> (u64, &str) {
    match name.rsplit_once('-') {
        Some((_, suffix)) => match suffix.parse::<u64>() {
            Ok(n) => (n, name),
            Err(_) => (u64::MAX, name),
        },
        None => (u64::MAX, name),
    }
}

/// Build the document from a cluster's current server membership and the
/// ports routed through its load balancer. Servers are sorted by index so
/// the result never depends on iteration or join order (§4.5/§8: "ordering
/// is deterministic, by server index").
pub fn synthesize(cluster: &Cluster) -> LbConfigDoc {
    let mut server_names: Vec<&str> = cluster.servers().map(|n| n.name.as_str()).collect();
    server_names.sort_unstable_by_key(|name| server_index(name));

    let mut binds = Vec::new();

    binds.push(Bind {
        listen_port: cluster.kube_api.container_port,
        protocol: Protocol::Tcp,
        backends: server_names
            .iter()
            .map(|name| Backend {
                node: name.to_string(),
                port: cluster.kube_api.container_port,
            })
            .collect(),
    });

    if let Some(lb) = cluster.load_balancer() {
        let mut extra_ports: Vec<_> = lb.ports.iter().collect();
        extra_ports.sort_by_key(|p| (p.container_port, p.protocol == Protocol::Udp));
        for port in extra_ports {
            binds.push(Bind {
                listen_port: port.container_port,
                protocol: port.protocol,
                backends: server_names
                    .iter()
                    .map(|name| Backend {
                        node: name.to_string(),
                        port: port.container_port,
                    })
                    .collect(),
            });
        }
    }

    LbConfigDoc { binds }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::KubeApi;
    use crate::domain::network::ClusterNetwork;
    use crate::domain::node::{NetworkAttachment, Node};
    use crate::domain::role::Role;

    fn cluster_with_servers(names: &[&str]) -> Cluster {
        let mut nodes = Vec::new();
        for name in names {
            let mut n = Node::new(name.to_string(), Role::Server);
            n.networks.push(NetworkAttachment {
                name: "net".into(),
                primary: true,
            });
            nodes.push(n);
        }
        let mut lb = Node::new("demo-serverlb", Role::LoadBalancer);
        lb.networks.push(NetworkAttachment {
            name: "net".into(),
            primary: true,
        });
        nodes.push(lb);
        Cluster {
            name: "demo".into(),
            nodes,
            init_node: if names.len() > 1 {
                Some(names[0].to_string())
            } else {
                None
            },
            server_load_balancer: Some("demo-serverlb".into()),
            network: ClusterNetwork::adopted("net"),
            token: "tok".into(),
            kube_api: KubeApi::default(),
            image_volume: None,
        }
    }

    #[test]
    fn synthesis_is_independent_of_node_insertion_order() {
        let a = cluster_with_servers(&["demo-server-1", "demo-server-0"]);
        let b = cluster_with_servers(&["demo-server-0", "demo-server-1"]);
        assert_eq!(synthesize(&a), synthesize(&b));
    }

    #[test]
    fn synthesis_includes_one_backend_per_server() {
        let c = cluster_with_servers(&["demo-server-0", "demo-server-1", "demo-server-2"]);
        let doc = synthesize(&c);
        assert_eq!(doc.binds[0].backends.len(), 3);
    }

    #[test]
    fn ordering_is_by_numeric_index_not_lexicographic() {
        let names: Vec<String> = (0..11).map(|i| format!("demo-server-{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let c = cluster_with_servers(&refs);
        let doc = synthesize(&c);
        let ordered: Vec<&str> = doc.binds[0].backends.iter().map(|b| b.node.as_str()).collect();
        let expected: Vec<String> = (0..11).map(|i| format!("demo-server-{i}")).collect();
        assert_eq!(ordered, expected);
    }

    #[test]
    fn to_bytes_is_stable_across_calls() {
        let c = cluster_with_servers(&["demo-server-0"]);
        let doc = synthesize(&c);
        assert_eq!(doc.to_bytes(), synthesize(&c).to_bytes());
    }
}
