//! ClusterNetwork — the primary network a cluster owns or adopts (§3).

use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

/// IP address management state for a managed network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipam {
    pub managed: bool,
    pub ip_prefix: Option<IpNet>,
    pub ips_used: Vec<IpAddr>,
}

impl Ipam {
    pub fn unmanaged() -> Self {
        Self {
            managed: false,
            ip_prefix: None,
            ips_used: Vec::new(),
        }
    }

    pub fn managed(prefix: IpNet) -> Self {
        Self {
            managed: true,
            ip_prefix: Some(prefix),
            ips_used: Vec::new(),
        }
    }
}

/// The network a cluster's nodes attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNetwork {
    pub name: String,
    pub ipam: Ipam,
    /// True when the network was adopted rather than created — never
    /// removed on rollback or cluster delete (§4.6 Rollback).
    pub external: bool,
}

impl ClusterNetwork {
    pub fn adopted(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ipam: Ipam::unmanaged(),
            external: true,
        }
    }

    pub fn owned(name: impl Into<String>, prefix: IpNet) -> Self {
        Self {
            name: name.into(),
            ipam: Ipam::managed(prefix),
            external: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adopted_network_is_never_removable() {
        let net = ClusterNetwork::adopted("preexisting");
        assert!(net.external);
        assert!(!net.ipam.managed);
    }

    #[test]
    fn owned_network_carries_a_prefix() {
        let prefix: IpNet = "172.20.0.0/16".parse().unwrap();
        let net = ClusterNetwork::owned("demo", prefix);
        assert!(!net.external);
        assert_eq!(net.ipam.ip_prefix, Some(prefix));
    }
}
