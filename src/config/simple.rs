//! The external `Simple` configuration document shape (§6): what a user
//! writes on disk. Deserialized only after the document has been merged,
//! migrated to [`super::versions::ApiVersion::CURRENT`] and schema-validated
//! — so every field here can assume it is well-formed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    #[serde(default)]
    pub servers: u32,
    #[serde(default)]
    pub agents: u32,
    pub image: Option<String>,
    pub network: Option<String>,
    pub token: Option<String>,
    #[serde(rename = "kubeAPI", default)]
    pub kube_api: Option<KubeApiSpec>,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default)]
    pub env: Vec<EnvSpec>,
    #[serde(default)]
    pub files: Vec<FileSpec>,
    #[serde(default)]
    pub registries: RegistriesSpec,
    #[serde(default)]
    pub options: OptionsSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubeApiSpec {
    pub host: Option<String>,
    #[serde(rename = "hostIP")]
    pub host_ip: Option<String>,
    #[serde(rename = "hostPort")]
    pub host_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSpec {
    pub port: String,
    #[serde(rename = "nodeFilters", default)]
    pub node_filters: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub volume: String,
    #[serde(rename = "nodeFilters", default)]
    pub node_filters: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvSpec {
    #[serde(rename = "envVar")]
    pub env_var: String,
    #[serde(rename = "nodeFilters", default)]
    pub node_filters: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSpec {
    #[serde(default)]
    pub description: String,
    pub source: String,
    pub destination: String,
    #[serde(rename = "nodeFilters", default)]
    pub node_filters: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistriesSpec {
    pub create: Option<RegistryCreateSpec>,
    #[serde(rename = "use", default)]
    pub use_existing: Vec<String>,
    pub config: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryCreateSpec {
    pub name: Option<String>,
    pub host: Option<String>,
    #[serde(rename = "hostPort")]
    pub host_port: Option<u16>,
    pub image: Option<String>,
    pub proxy: Option<ProxySpec>,
    #[serde(default)]
    pub volumes: Vec<String>,
}

impl RegistryCreateSpec {
    /// A syntactically-present `registries.create` with every field at its
    /// default transforms to *absent* (§4.1 Empty-substructure rule) — this
    /// is what lets an inherited/default config layer carry a placeholder
    /// `create: {}` without accidentally provisioning a registry.
    pub fn is_effectively_empty(&self) -> bool {
        self.name.is_none()
            && self.host.is_none()
            && self.host_port.is_none()
            && self.image.is_none()
            && self.proxy.is_none()
            && self.volumes.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySpec {
    #[serde(rename = "remoteURL")]
    pub remote_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionsSpec {
    #[serde(default)]
    pub k3d: K3dOptions,
    #[serde(default)]
    pub k3s: K3sOptions,
    #[serde(default)]
    pub kubeconfig: KubeconfigOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct K3dOptions {
    #[serde(default)]
    pub wait: bool,
    pub timeout: Option<String>,
    #[serde(rename = "disableLoadbalancer", default)]
    pub disable_loadbalancer: bool,
    #[serde(rename = "disableImageVolume", default)]
    pub disable_image_volume: bool,
}

impl Default for K3dOptions {
    fn default() -> Self {
        Self {
            wait: true,
            timeout: None,
            disable_loadbalancer: false,
            disable_image_volume: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct K3sOptions {
    #[serde(rename = "extraArgs", default)]
    pub extra_args: Vec<ExtraArgSpec>,
    #[serde(rename = "nodeLabels", default)]
    pub node_labels: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraArgSpec {
    pub arg: String,
    #[serde(rename = "nodeFilters", default)]
    pub node_filters: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubeconfigOptions {
    #[serde(rename = "updateDefault", default)]
    pub update_default: bool,
    #[serde(rename = "switchCurrentContext", default)]
    pub switch_current_context: bool,
}

impl Default for KubeconfigOptions {
    fn default() -> Self {
        Self {
            update_default: true,
            switch_current_context: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_a_minimal_document() {
        let doc = r#"
apiVersion: k3cluster.io/v1alpha5
kind: Simple
metadata:
  name: demo
servers: 1
agents: 2
"#;
        let cfg: SimpleConfig = serde_yaml::from_str(doc).unwrap();
        assert_eq!(cfg.metadata.name, "demo");
        assert_eq!(cfg.servers, 1);
        assert_eq!(cfg.agents, 2);
        assert!(cfg.options.k3d.wait);
        assert!(cfg.options.kubeconfig.update_default);
    }

    #[test]
    fn deserializes_ports_and_registries() {
        let doc = r#"
apiVersion: k3cluster.io/v1alpha5
kind: Simple
metadata:
  name: demo
ports:
  - port: "8080:80/tcp"
    nodeFilters: ["loadbalancer"]
registries:
  create:
    name: demo-registry
    hostPort: 5000
  use: ["k3d-other-registry:5000"]
"#;
        let cfg: SimpleConfig = serde_yaml::from_str(doc).unwrap();
        assert_eq!(cfg.ports.len(), 1);
        assert_eq!(cfg.ports[0].node_filters, vec!["loadbalancer"]);
        let create = cfg.registries.create.unwrap();
        assert_eq!(create.name.as_deref(), Some("demo-registry"));
        assert_eq!(cfg.registries.use_existing, vec!["k3d-other-registry:5000"]);
    }
}
