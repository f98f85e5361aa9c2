//! `SimpleConfig` → domain aggregate (§4.1 stage 4, last stage of the
//! pipeline). Everything downstream — the orchestrator, the node manager,
//! the LB synthesizer — only ever sees [`crate::domain`] types.

use std::fs;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::domain::cluster::{validate_cluster_name, Cluster, KubeApi};
use crate::domain::network::ClusterNetwork;
use crate::domain::node::{
    FileTransform, Hook, HookAction, HookStage, NetworkAttachment, Node, PortMapping, Protocol,
    VolumeMount,
};
use crate::domain::registry::{ProxyConfig, Registry, RegistryLifecycle};
use crate::domain::role::Role;

use super::error::ConfigError;
use super::filters::NodeFilter;
use super::simple::{EnvSpec, FileSpec, PortSpec, SimpleConfig, VolumeSpec};

/// Everything a `Plan` stage needs: the cluster aggregate plus any
/// independently-lifecycled registries it references or creates.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub cluster: Cluster,
    pub registries: Vec<Registry>,
    pub run_settings: RunSettings,
}

/// `options.k3d`/`options.kubeconfig` (§6), carried past `Plan` so a caller
/// building [`crate::orchestrator::RunOptions`] or writing a kubeconfig
/// doesn't have to re-parse the document itself.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub wait: bool,
    pub timeout: Option<std::time::Duration>,
    pub kubeconfig_update_default: bool,
    pub kubeconfig_switch_context: bool,
}

/// Parse a Go-duration-flavored string (`"60s"`, `"2m"`, `"1h"`; a bare
/// number is seconds) the way `options.k3d.timeout` is written in a config
/// document.
pub fn parse_duration(raw: &str) -> Result<std::time::Duration, ConfigError> {
    let raw = raw.trim();
    let invalid = || ConfigError::InvalidNodeFilter(raw.to_string(), "not a valid duration".to_string());
    let (num, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: u64 = num.parse().map_err(|_| invalid())?;
    let secs = match unit {
        "s" | "" => value,
        "m" => value * 60,
        "h" => value * 3600,
        _ => return Err(invalid()),
    };
    Ok(std::time::Duration::from_secs(secs))
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn parse_port_spec(spec: &str) -> Result<PortMapping, ConfigError> {
    let (port_part, proto_part) = match spec.rsplit_once('/') {
        Some((p, proto)) => (p, Some(proto)),
        None => (spec, None),
    };
    let protocol = match proto_part {
        None | Some("tcp") => Protocol::Tcp,
        Some("udp") => Protocol::Udp,
        Some(other) => {
            return Err(ConfigError::InvalidNodeFilter(
                spec.to_string(),
                format!("unknown protocol {other:?}"),
            ))
        }
    };
    let (host_port, container_port) = match port_part.split_once(':') {
        Some((h, c)) => {
            let host: u16 = h.parse().map_err(|_| {
                ConfigError::InvalidNodeFilter(spec.to_string(), format!("invalid host port {h:?}"))
            })?;
            let container: u16 = c.parse().map_err(|_| {
                ConfigError::InvalidNodeFilter(
                    spec.to_string(),
                    format!("invalid container port {c:?}"),
                )
            })?;
            (Some(host), container)
        }
        None => {
            let both: u16 = port_part.parse().map_err(|_| {
                ConfigError::InvalidNodeFilter(spec.to_string(), "invalid port".to_string())
            })?;
            (Some(both), both)
        }
    };
    Ok(PortMapping {
        host_ip: None,
        host_port,
        container_port,
        protocol,
    })
}

fn default_filter_for_ports(has_loadbalancer: bool) -> &'static str {
    if has_loadbalancer {
        "loadbalancer"
    } else {
        "server:0"
    }
}

fn apply_ports(
    nodes: &mut [Node],
    ports: &[PortSpec],
    has_loadbalancer: bool,
) -> Result<(), ConfigError> {
    for spec in ports {
        let raw_filter = if spec.node_filters.is_empty() {
            default_filter_for_ports(has_loadbalancer).to_string()
        } else {
            spec.node_filters.join(";")
        };
        let filter = NodeFilter::parse(&raw_filter)?;
        let mapping = parse_port_spec(&spec.port)?;
        let names: Vec<String> = filter.resolve(nodes)?.iter().map(|n| n.name.clone()).collect();
        for name in names {
            if let Some(node) = nodes.iter_mut().find(|n| n.name == name) {
                node.ports.push(mapping.clone());
            }
        }
    }
    Ok(())
}

fn apply_volumes(nodes: &mut [Node], volumes: &[VolumeSpec]) -> Result<(), ConfigError> {
    for spec in volumes {
        let raw_filter = if spec.node_filters.is_empty() {
            "all".to_string()
        } else {
            spec.node_filters.join(";")
        };
        let filter = NodeFilter::parse(&raw_filter)?;
        let (source, target, read_only) = match spec.volume.split_once(':') {
            Some((s, rest)) => match rest.rsplit_once(':') {
                Some((t, "ro")) => (s.to_string(), t.to_string(), true),
                _ => (s.to_string(), rest.to_string(), false),
            },
            None => {
                return Err(ConfigError::InvalidNodeFilter(
                    spec.volume.clone(),
                    "expected <source>:<target>[:ro]".to_string(),
                ))
            }
        };
        let names: Vec<String> = filter.resolve(nodes)?.iter().map(|n| n.name.clone()).collect();
        for name in names {
            if let Some(node) = nodes.iter_mut().find(|n| n.name == name) {
                node.volumes.push(VolumeMount {
                    source: source.clone(),
                    target: target.clone(),
                    read_only,
                });
            }
        }
    }
    Ok(())
}

fn apply_env(nodes: &mut [Node], env: &[EnvSpec]) -> Result<(), ConfigError> {
    for spec in env {
        let raw_filter = if spec.node_filters.is_empty() {
            "all".to_string()
        } else {
            spec.node_filters.join(";")
        };
        let filter = NodeFilter::parse(&raw_filter)?;
        let (key, value) = spec.env_var.split_once('=').ok_or_else(|| {
            ConfigError::InvalidNodeFilter(spec.env_var.clone(), "expected KEY=VALUE".to_string())
        })?;
        let names: Vec<String> = filter.resolve(nodes)?.iter().map(|n| n.name.clone()).collect();
        for name in names {
            if let Some(node) = nodes.iter_mut().find(|n| n.name == name) {
                node.env.insert(key.to_string(), value.to_string());
            }
        }
    }
    Ok(())
}

fn apply_files(
    nodes: &mut [Node],
    files: &[FileSpec],
    config_dir: Option<&std::path::Path>,
) -> Result<(), ConfigError> {
    for spec in files {
        let raw_filter = if spec.node_filters.is_empty() {
            "all".to_string()
        } else {
            spec.node_filters.join(";")
        };
        let filter = NodeFilter::parse(&raw_filter)?;
        let source_path = match config_dir {
            Some(dir) => dir.join(&spec.source),
            None => std::path::PathBuf::from(&spec.source),
        };
        let content = fs::read(&source_path).map_err(|e| ConfigError::FileReadFailure {
            path: spec.source.clone(),
            reason: e.to_string(),
        })?;
        let names: Vec<String> = filter.resolve(nodes)?.iter().map(|n| n.name.clone()).collect();
        for name in names {
            if let Some(node) = nodes.iter_mut().find(|n| n.name == name) {
                node.push_hook(
                    HookStage::PreStart,
                    HookAction::WriteFile {
                        path: spec.destination.clone(),
                        content: content.clone(),
                        mode: 0o644,
                        description: if spec.description.is_empty() {
                            format!("write {}", spec.destination)
                        } else {
                            spec.description.clone()
                        },
                    },
                );
            }
        }
    }
    Ok(())
}

fn apply_extra_args(nodes: &mut [Node], args: &[super::simple::ExtraArgSpec]) -> Result<(), ConfigError> {
    for spec in args {
        let raw_filter = if spec.node_filters.is_empty() {
            "all".to_string()
        } else {
            spec.node_filters.join(";")
        };
        let filter = NodeFilter::parse(&raw_filter)?;
        let names: Vec<String> = filter.resolve(nodes)?.iter().map(|n| n.name.clone()).collect();
        for name in names {
            if let Some(node) = nodes.iter_mut().find(|n| n.name == name) {
                node.args.push(spec.arg.clone());
            }
        }
    }
    Ok(())
}

fn apply_node_labels(nodes: &mut [Node], labels: &[String]) -> Result<(), ConfigError> {
    for entry in labels {
        let (kv, raw_filter) = match entry.split_once('@') {
            Some((kv, f)) => (kv, f.to_string()),
            None => (entry.as_str(), "all".to_string()),
        };
        let (key, value) = kv.split_once('=').ok_or_else(|| {
            ConfigError::InvalidNodeFilter(entry.clone(), "expected key=value[@nodeFilter]".to_string())
        })?;
        let filter = NodeFilter::parse(&raw_filter)?;
        let names: Vec<String> = filter.resolve(nodes)?.iter().map(|n| n.name.clone()).collect();
        for name in names {
            if let Some(node) = nodes.iter_mut().find(|n| n.name == name) {
                node.k3s_node_labels.insert(key.to_string(), value.to_string());
            }
        }
    }
    Ok(())
}

fn build_registries(
    cluster_name: &str,
    cfg: &SimpleConfig,
) -> Result<(Vec<Registry>, Option<Hook>), ConfigError> {
    let mut registries = Vec::new();

    if let Some(create) = &cfg.registries.create {
        if !create.is_effectively_empty() {
            let name = create
                .name
                .clone()
                .unwrap_or_else(|| format!("{cluster_name}-registry"));
            registries.push(Registry {
                host: create.host.clone().unwrap_or_else(|| name.clone()),
                name,
                host_port: create.host_port.unwrap_or(0),
                image: create
                    .image
                    .clone()
                    .unwrap_or_else(|| Role::Registry.default_image().to_string()),
                lifecycle: RegistryLifecycle::Owned,
                networks: Vec::new(),
                proxy: create.proxy.as_ref().map(|p| ProxyConfig {
                    remote_url: Some(p.remote_url.clone()),
                    username: p.username.clone(),
                }),
            });
        }
    }

    for reference in &cfg.registries.use_existing {
        let (host, port) = match reference.rsplit_once(':') {
            Some((h, p)) => (h.to_string(), p.parse().unwrap_or(0)),
            None => (reference.clone(), 0),
        };
        registries.push(Registry {
            name: reference.clone(),
            host,
            host_port: port,
            image: Role::Registry.default_image().to_string(),
            lifecycle: RegistryLifecycle::External,
            networks: Vec::new(),
            proxy: None,
        });
    }

    // Collision rule (§4.3): if a `use` reference's resolved name matches
    // the name the `create` entry would provision under, `Use` wins and no
    // Create occurs — this protects a pre-existing registry that happens
    // to share the auto-generated default name from being clobbered.
    let use_names: std::collections::HashSet<&str> = registries
        .iter()
        .filter(|r| r.is_external())
        .map(|r| r.name.as_str())
        .collect();
    registries.retain(|r| r.is_external() || !use_names.contains(r.name.as_str()));

    let config_hook = cfg.registries.config.as_ref().map(|inline| {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(inline).unwrap_or(serde_yaml::Value::Null);
        Hook {
            stage: HookStage::PreStart,
            action: HookAction::RewriteFile {
                path: "/etc/rancher/k3s/registries.yaml".to_string(),
                transform: FileTransform::MergeYaml(doc),
            },
        }
    });

    Ok((registries, config_hook))
}

/// Turn a validated, current-version [`SimpleConfig`] into the domain
/// `Cluster` aggregate the orchestrator operates on. `config_dir` anchors
/// relative `files[].source` paths (the directory the config file lives in).
pub fn transform(
    cfg: &SimpleConfig,
    config_dir: Option<&std::path::Path>,
) -> Result<TransformOutput, ConfigError> {
    validate_cluster_name(&cfg.metadata.name)
        .map_err(|e| ConfigError::InvalidClusterName(e.to_string()))?;

    let server_count = if cfg.servers == 0 { 1 } else { cfg.servers };
    let agent_count = cfg.agents;
    let disable_lb = cfg.options.k3d.disable_loadbalancer;
    let has_loadbalancer = !disable_lb;

    let network_name = cfg
        .network
        .clone()
        .unwrap_or_else(|| format!("k3cluster-{}", cfg.metadata.name));
    let network = match &cfg.network {
        Some(name) => ClusterNetwork::adopted(name.clone()),
        None => ClusterNetwork {
            name: network_name.clone(),
            ipam: crate::domain::network::Ipam::unmanaged(),
            external: false,
        },
    };

    let mut nodes = Vec::new();
    for i in 0..server_count {
        let name = format!("{}-server-{i}", cfg.metadata.name);
        let mut node = Node::new(name, Role::Server);
        if let Some(image) = &cfg.image {
            node.image = image.clone();
        }
        node.networks.push(NetworkAttachment {
            name: network.name.clone(),
            primary: true,
        });
        nodes.push(node);
    }
    for i in 0..agent_count {
        let name = format!("{}-agent-{i}", cfg.metadata.name);
        let mut node = Node::new(name, Role::Agent);
        if let Some(image) = &cfg.image {
            node.image = image.clone();
        }
        node.networks.push(NetworkAttachment {
            name: network.name.clone(),
            primary: true,
        });
        nodes.push(node);
    }
    if has_loadbalancer {
        let name = format!("{}-serverlb", cfg.metadata.name);
        let mut node = Node::new(name, Role::LoadBalancer);
        node.networks.push(NetworkAttachment {
            name: network.name.clone(),
            primary: true,
        });
        nodes.push(node);
    }

    apply_ports(&mut nodes, &cfg.ports, has_loadbalancer)?;
    apply_volumes(&mut nodes, &cfg.volumes)?;
    apply_env(&mut nodes, &cfg.env)?;
    apply_files(&mut nodes, &cfg.files, config_dir)?;
    apply_extra_args(&mut nodes, &cfg.options.k3s.extra_args)?;
    apply_node_labels(&mut nodes, &cfg.options.k3s.node_labels)?;

    let (registries, config_hook) = build_registries(&cfg.metadata.name, cfg)?;
    if let Some(hook) = config_hook {
        for node in nodes.iter_mut().filter(|n| n.role == Role::Server) {
            node.hooks.push(hook.clone());
        }
    }

    let init_node = if server_count > 1 {
        Some(format!("{}-server-0", cfg.metadata.name))
    } else {
        None
    };

    let server_load_balancer = if has_loadbalancer {
        Some(format!("{}-serverlb", cfg.metadata.name))
    } else {
        None
    };

    let kube_api = KubeApi {
        host: cfg
            .kube_api
            .as_ref()
            .and_then(|k| k.host.clone())
            .unwrap_or_else(|| KubeApi::default().host),
        host_ip: cfg
            .kube_api
            .as_ref()
            .and_then(|k| k.host_ip.clone())
            .unwrap_or_else(|| KubeApi::default().host_ip),
        host_port: cfg
            .kube_api
            .as_ref()
            .and_then(|k| k.host_port)
            .unwrap_or_else(|| KubeApi::default().host_port),
        container_port: KubeApi::default().container_port,
    };

    let cluster = Cluster {
        name: cfg.metadata.name.clone(),
        nodes,
        init_node,
        server_load_balancer,
        network,
        token: cfg.token.clone().unwrap_or_else(generate_token),
        kube_api,
        image_volume: if cfg.options.k3d.disable_image_volume {
            None
        } else {
            Some(format!("{}-images", cfg.metadata.name))
        },
    };

    cluster
        .check_invariants()
        .map_err(|e| ConfigError::SchemaViolation(vec![e.to_string()]))?;

    let timeout = cfg
        .options
        .k3d
        .timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    let run_settings = RunSettings {
        wait: cfg.options.k3d.wait,
        timeout,
        kubeconfig_update_default: cfg.options.kubeconfig.update_default,
        kubeconfig_switch_context: cfg.options.kubeconfig.switch_current_context,
    };

    Ok(TransformOutput {
        cluster,
        registries,
        run_settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(servers: u32, agents: u32) -> SimpleConfig {
        SimpleConfig {
            api_version: "k3cluster.io/v1alpha5".into(),
            kind: "Simple".into(),
            metadata: super::super::simple::Metadata { name: "demo".into() },
            servers,
            agents,
            image: None,
            network: None,
            token: None,
            kube_api: None,
            ports: vec![],
            volumes: vec![],
            env: vec![],
            files: vec![],
            registries: Default::default(),
            options: Default::default(),
        }
    }

    #[test]
    fn single_server_has_no_init_node() {
        let out = transform(&minimal(1, 0), None).unwrap();
        assert!(out.cluster.init_node.is_none());
        assert_eq!(out.cluster.servers().count(), 1);
        assert!(out.cluster.load_balancer().is_some());
    }

    #[test]
    fn ha_cluster_gets_deterministic_init_node() {
        let out = transform(&minimal(3, 2), None).unwrap();
        assert_eq!(out.cluster.init_node.as_deref(), Some("demo-server-0"));
        assert_eq!(out.cluster.servers().count(), 3);
        assert_eq!(out.cluster.agents().count(), 2);
    }

    #[test]
    fn zero_servers_defaults_to_one() {
        let out = transform(&minimal(0, 0), None).unwrap();
        assert_eq!(out.cluster.servers().count(), 1);
    }

    #[test]
    fn ports_without_filter_default_to_loadbalancer() {
        let mut cfg = minimal(1, 0);
        cfg.ports.push(PortSpec {
            port: "8080:80/tcp".into(),
            node_filters: vec![],
        });
        let out = transform(&cfg, None).unwrap();
        let lb = out.cluster.load_balancer().unwrap();
        assert_eq!(lb.ports.len(), 1);
        assert_eq!(lb.ports[0].host_port, Some(8080));
    }

    #[test]
    fn disabling_loadbalancer_routes_ports_to_first_server() {
        let mut cfg = minimal(1, 0);
        cfg.options.k3d.disable_loadbalancer = true;
        cfg.ports.push(PortSpec {
            port: "6443".into(),
            node_filters: vec![],
        });
        let out = transform(&cfg, None).unwrap();
        assert!(out.cluster.load_balancer().is_none());
        let server = out.cluster.node("demo-server-0").unwrap();
        assert_eq!(server.ports.len(), 1);
    }

    #[test]
    fn empty_registries_create_transforms_to_absent() {
        let mut cfg = minimal(1, 0);
        cfg.registries.create = Some(super::super::simple::RegistryCreateSpec {
            name: None,
            host: None,
            host_port: None,
            image: None,
            proxy: None,
            volumes: vec![],
        });
        let out = transform(&cfg, None).unwrap();
        assert!(out.registries.is_empty());
    }

    #[test]
    fn use_reference_colliding_with_create_name_wins() {
        let mut cfg = minimal(1, 0);
        cfg.registries.create = Some(super::super::simple::RegistryCreateSpec {
            name: Some("demo-registry".into()),
            host: None,
            host_port: None,
            image: None,
            proxy: None,
            volumes: vec![],
        });
        cfg.registries.use_existing.push("demo-registry".into());
        let out = transform(&cfg, None).unwrap();
        assert_eq!(out.registries.len(), 1);
        assert!(out.registries[0].is_external());
    }

    #[test]
    fn registries_use_is_external_and_unowned() {
        let mut cfg = minimal(1, 0);
        cfg.registries.use_existing.push("k3d-shared:5000".into());
        let out = transform(&cfg, None).unwrap();
        assert_eq!(out.registries.len(), 1);
        assert!(out.registries[0].is_external());
        assert_eq!(out.registries[0].host_port, 5000);
    }
}
