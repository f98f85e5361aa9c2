//! Role — the tagged variant every node, hook default and readiness probe hangs off of.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four container roles the orchestrator knows how to compose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Server,
    Agent,
    LoadBalancer,
    Registry,
}

impl Role {
    /// Bundled image reference used when the user doesn't override `image`.
    pub fn default_image(self) -> &'static str {
        match self {
            Role::Server | Role::Agent => "rancher/k3s:v1.30.3-k3s1",
            Role::LoadBalancer => "ghcr.io/k3cluster/proxy:latest",
            Role::Registry => "registry:2",
        }
    }

    /// Whether this role participates in the cluster's init/join ordering
    /// (§5 ordering guarantees only apply to server/agent/loadbalancer).
    pub fn is_k3s_node(self) -> bool {
        matches!(self, Role::Server | Role::Agent)
    }

    pub fn label_value(self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Agent => "agent",
            Role::LoadBalancer => "loadbalancer",
            Role::Registry => "registry",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_and_agent_are_k3s_nodes() {
        assert!(Role::Server.is_k3s_node());
        assert!(Role::Agent.is_k3s_node());
        assert!(!Role::LoadBalancer.is_k3s_node());
        assert!(!Role::Registry.is_k3s_node());
    }

    #[test]
    fn label_values_round_trip_through_serde() {
        let json = serde_json::to_string(&Role::LoadBalancer).unwrap();
        assert_eq!(json, "\"loadbalancer\"");
        let back: Role = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Role::LoadBalancer);
    }
}
