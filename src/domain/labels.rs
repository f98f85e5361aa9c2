//! Standard label set (§3 invariants) and the label-based inverse lookups
//! that are this system's only durable state.
//!
//! Every object the runtime creates carries these labels verbatim; every
//! query reads them back. A label read never panics on a partially-tagged
//! container — it returns `LabelError` instead (Design Notes: "container
//! label assumptions without defensive checks").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::role::Role;

pub const PRODUCT: &str = "k3cluster";

pub const LABEL_APP: &str = "app";
pub const LABEL_CLUSTER: &str = "cluster";
pub const LABEL_ROLE: &str = "role";
pub const LABEL_CLUSTER_URL: &str = "cluster.url";
pub const LABEL_CLUSTER_TOKEN: &str = "cluster.token";
pub const LABEL_REGISTRY_HOST: &str = "registry.host";
/// Set only on registry containers themselves (distinct from
/// `LABEL_REGISTRY_HOST`, which a *cluster*'s nodes carry to record which
/// registry they reference) — lets the registry subsystem recover a
/// container's published port from labels alone.
pub const LABEL_REGISTRY_HOST_PORT: &str = "k3cluster.registry.hostPort";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("missing required label {0:?}")]
    Missing(&'static str),
    #[error("malformed label {key:?}: {value:?}")]
    Malformed { key: &'static str, value: String },
}

/// The mandatory labels attached to every container, network and volume
/// this system creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardLabels {
    pub cluster: String,
    pub role: Role,
    pub cluster_url: String,
    pub cluster_token: String,
    pub registry_host: Option<String>,
}

impl StandardLabels {
    pub fn new(cluster: impl Into<String>, role: Role, cluster_url: impl Into<String>, cluster_token: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            role,
            cluster_url: cluster_url.into(),
            cluster_token: cluster_token.into(),
            registry_host: None,
        }
    }

    pub fn with_registry_host(mut self, host: impl Into<String>) -> Self {
        self.registry_host = Some(host.into());
        self
    }

    /// Render as the flat string map the runtime stores on the object.
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(LABEL_APP.to_string(), PRODUCT.to_string());
        map.insert(LABEL_CLUSTER.to_string(), self.cluster.clone());
        map.insert(LABEL_ROLE.to_string(), self.role.label_value().to_string());
        map.insert(LABEL_CLUSTER_URL.to_string(), self.cluster_url.clone());
        map.insert(LABEL_CLUSTER_TOKEN.to_string(), self.cluster_token.clone());
        if let Some(host) = &self.registry_host {
            map.insert(LABEL_REGISTRY_HOST.to_string(), host.clone());
        }
        map
    }

    /// Parse labels back from a runtime object. Used by every inverse
    /// lookup (cluster → nodes, registry → referencing clusters).
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, LabelError> {
        let app = map.get(LABEL_APP).ok_or(LabelError::Missing(LABEL_APP))?;
        if app != PRODUCT {
            return Err(LabelError::Malformed {
                key: LABEL_APP,
                value: app.clone(),
            });
        }
        let cluster = map
            .get(LABEL_CLUSTER)
            .ok_or(LabelError::Missing(LABEL_CLUSTER))?
            .clone();
        let role_str = map.get(LABEL_ROLE).ok_or(LabelError::Missing(LABEL_ROLE))?;
        let role = match role_str.as_str() {
            "server" => Role::Server,
            "agent" => Role::Agent,
            "loadbalancer" => Role::LoadBalancer,
            "registry" => Role::Registry,
            other => {
                return Err(LabelError::Malformed {
                    key: LABEL_ROLE,
                    value: other.to_string(),
                })
            }
        };
        let cluster_url = map
            .get(LABEL_CLUSTER_URL)
            .ok_or(LabelError::Missing(LABEL_CLUSTER_URL))?
            .clone();
        let cluster_token = map
            .get(LABEL_CLUSTER_TOKEN)
            .ok_or(LabelError::Missing(LABEL_CLUSTER_TOKEN))?
            .clone();
        let registry_host = map.get(LABEL_REGISTRY_HOST).cloned();

        Ok(Self {
            cluster,
            role,
            cluster_url,
            cluster_token,
            registry_host,
        })
    }
}

/// A label selector used for `List-by-label` runtime queries.
#[derive(Debug, Clone, Default)]
pub struct LabelSelector {
    pub(crate) pairs: Vec<(String, String)>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    pub fn for_cluster(cluster: &str) -> Self {
        Self::new()
            .with(LABEL_APP, PRODUCT)
            .with(LABEL_CLUSTER, cluster)
    }

    pub fn for_cluster_role(cluster: &str, role: Role) -> Self {
        Self::for_cluster(cluster).with(LABEL_ROLE, role.label_value())
    }

    pub fn for_registry() -> Self {
        Self::new().with(LABEL_APP, PRODUCT).with(LABEL_ROLE, Role::Registry.label_value())
    }

    /// Render as `key=value` filter strings, the shape most container
    /// daemon APIs (and bollard's `ListContainersOptions`) expect.
    pub fn to_filter_strings(&self) -> Vec<String> {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_map() {
        let labels = StandardLabels::new("demo", Role::Server, "https://0.0.0.0:6443", "tok")
            .with_registry_host("reg.local:5000");
        let map = labels.to_map();
        let back = StandardLabels::from_map(&map).unwrap();
        assert_eq!(labels, back);
    }

    #[test]
    fn missing_label_is_an_error_not_a_panic() {
        let map = HashMap::new();
        let err = StandardLabels::from_map(&map).unwrap_err();
        assert_eq!(err, LabelError::Missing(LABEL_APP));
    }

    #[test]
    fn malformed_role_is_reported() {
        let mut map = HashMap::new();
        map.insert(LABEL_APP.to_string(), PRODUCT.to_string());
        map.insert(LABEL_CLUSTER.to_string(), "demo".to_string());
        map.insert(LABEL_ROLE.to_string(), "bogus".to_string());
        let err = StandardLabels::from_map(&map).unwrap_err();
        assert!(matches!(err, LabelError::Malformed { key: LABEL_ROLE, .. }));
    }

    #[test]
    fn selector_renders_filter_strings() {
        let sel = LabelSelector::for_cluster_role("demo", Role::Agent);
        let filters = sel.to_filter_strings();
        assert!(filters.contains(&"app=k3cluster".to_string()));
        assert!(filters.contains(&"cluster=demo".to_string()));
        assert!(filters.contains(&"role=agent".to_string()));
    }
}
