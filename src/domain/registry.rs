//! Registry — an independently-lifecycled OCI registry container (§3, §4.3).

use serde::{Deserialize, Serialize};

/// Registry proxy/pull-through configuration. Reserved for future
/// extension — `RegistryGet` today only ever returns `None` here (Design
/// Notes open question: the contract is identity + network memberships,
/// proxy config is a stub).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub remote_url: Option<String>,
    pub username: Option<String>,
}

/// How a registry relates to the cluster that references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryLifecycle {
    /// Created by this orchestration; deleted with the owning cluster.
    Owned,
    /// Referenced via `Use`; never started, stopped, or deleted here.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    pub name: String,
    pub host: String,
    pub host_port: u16,
    pub image: String,
    pub lifecycle: RegistryLifecycle,
    /// Networks this registry container is currently joined to.
    pub networks: Vec<String>,
    pub proxy: Option<ProxyConfig>,
}

/// The registry container's own listen port (`registry:2`'s default),
/// used whenever no host port was published for it.
const DEFAULT_REGISTRY_PORT: u16 = 5000;

impl Registry {
    pub fn endpoint(&self) -> String {
        let port = if self.host_port == 0 {
            DEFAULT_REGISTRY_PORT
        } else {
            self.host_port
        };
        format!("{}:{}", self.host, port)
    }

    pub fn is_external(&self) -> bool {
        matches!(self.lifecycle, RegistryLifecycle::External)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_formats_host_and_port() {
        let reg = Registry {
            name: "demo-registry".into(),
            host: "demo-registry".into(),
            host_port: 5000,
            image: "registry:2".into(),
            lifecycle: RegistryLifecycle::Owned,
            networks: vec![],
            proxy: None,
        };
        assert_eq!(reg.endpoint(), "demo-registry:5000");
        assert!(!reg.is_external());
    }
}
