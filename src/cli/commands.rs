//! Command implementations for the CLI
//!
//! Each function here takes already-parsed arguments and returns a
//! `Result`; I/O (printing, process exit codes) is left to `main.rs`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{self, ConfigError, TransformOutput};
use crate::discovery::{self, ClusterSummary, DiscoveryError};
use crate::kubeconfig::{self, KubeconfigError};
use crate::orchestrator::{self, OrchestratorError, RunOptions, RunOutcome};
use crate::registry::RegistryError;
use crate::runtime::{docker::DockerRuntime, Runtime, RuntimeError};

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Kubeconfig(#[from] KubeconfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid --set override {0:?}: expected KEY=VALUE")]
    InvalidOverride(String),

    #[error("cluster {0:?} left {1} object(s) behind after delete: {2:?}")]
    DeleteIncomplete(String, usize, Vec<String>),
}

pub type CommandResult<T> = Result<T, CommandError>;

impl CommandError {
    /// §6 exit codes, extended with the same classification the
    /// orchestrator already applies to its own errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::Config(_) | CommandError::InvalidOverride(_) => 2,
            CommandError::Orchestrator(e) => e.exit_code(),
            CommandError::DeleteIncomplete(..) => 5,
            _ => 1,
        }
    }
}

/// Connect to the local container daemon. Centralized so every command
/// reports the same `Resource`-flavored message on a down daemon rather
/// than a raw `bollard` error.
pub fn connect_runtime() -> CommandResult<DockerRuntime> {
    Ok(DockerRuntime::connect()?)
}

/// Parse `--set key.path=value` into the nested `Value` mapping
/// [`config::load`] expects as its flag-override layer (§4.1: "explicit
/// flags > primary file"). A dotted key (`options.k3d.wait=false`)
/// expands into nested mappings; a bare key (`servers=3`) is one level.
/// Values are inferred as bool/int/float before falling back to string.
pub fn build_overrides(sets: &[String]) -> CommandResult<Value> {
    let mut root = Mapping::new();
    for raw in sets {
        let (path, value) = raw
            .split_once('=')
            .ok_or_else(|| CommandError::InvalidOverride(raw.clone()))?;
        if path.is_empty() {
            return Err(CommandError::InvalidOverride(raw.clone()));
        }
        let segments: Vec<&str> = path.split('.').collect();
        insert_path(&mut root, &segments, scalarize(value));
    }
    Ok(Value::Mapping(root))
}

fn scalarize(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::Number(f.into());
    }
    Value::String(raw.to_string())
}

fn insert_path(map: &mut Mapping, segments: &[&str], value: Value) {
    let (head, rest) = match segments.split_first() {
        Some(pair) => pair,
        None => return,
    };
    let key = Value::String(head.to_string());
    if rest.is_empty() {
        map.insert(key, value);
        return;
    }
    let mut child = match map.remove(&key) {
        Some(Value::Mapping(m)) => m,
        _ => Mapping::new(),
    };
    insert_path(&mut child, rest, value);
    map.insert(key, Value::Mapping(child));
}

/// Load and transform a config document, applying `--set` overrides, but
/// without touching the runtime (§4.1 stages 1-5 only).
pub fn load_plan(file: &Path, sets: &[String]) -> CommandResult<TransformOutput> {
    let overrides = build_overrides(sets)?;
    Ok(config::load(file, overrides)?)
}

pub fn run_options(plan: &TransformOutput, timeout: Option<Duration>, strict_hooks: bool, no_wait: bool) -> RunOptions {
    let mut opts = RunOptions {
        wait: plan.run_settings.wait && !no_wait,
        ..RunOptions::default()
    };
    if let Some(t) = timeout.or(plan.run_settings.timeout) {
        opts.ready_timeout = t;
    }
    opts.strict_hooks = strict_hooks;
    opts
}

/// Run `create`: Plan is already done by [`load_plan`]; this drives
/// Prepare→Create→Start&Configure→Wait→Commit (§4.6).
pub async fn create_cluster(
    runtime: &dyn Runtime,
    plan: TransformOutput,
    options: RunOptions,
) -> CommandResult<RunOutcome> {
    Ok(orchestrator::run(runtime, plan, options, CancellationToken::new()).await?)
}

pub async fn delete_cluster(runtime: &dyn Runtime, name: &str) -> CommandResult<()> {
    let leaked = discovery::delete_cluster(runtime, name).await?;
    if leaked.is_empty() {
        Ok(())
    } else {
        Err(CommandError::DeleteIncomplete(name.to_string(), leaked.len(), leaked))
    }
}

pub async fn list_clusters(runtime: &dyn Runtime) -> CommandResult<Vec<ClusterSummary>> {
    Ok(discovery::list_clusters(runtime).await?)
}

pub async fn get_cluster(runtime: &dyn Runtime, name: &str) -> CommandResult<ClusterSummary> {
    Ok(discovery::get_cluster(runtime, name).await?)
}

pub async fn start_cluster(runtime: &dyn Runtime, name: &str) -> CommandResult<usize> {
    Ok(discovery::start_cluster(runtime, name).await?)
}

pub async fn stop_cluster(runtime: &dyn Runtime, name: &str, grace: Duration) -> CommandResult<usize> {
    Ok(discovery::stop_cluster(runtime, name, grace).await?)
}

/// `kubeconfig write`: rediscover the cluster's API endpoint from its
/// servers' own labels (the join URL each node was provisioned with is
/// the authoritative source — §3 invariant: labels carry `cluster.url`).
pub async fn cluster_kubeconfig(
    runtime: &dyn Runtime,
    name: &str,
) -> CommandResult<kubeconfig::Kubeconfig> {
    use crate::domain::{LabelSelector, Role, StandardLabels};

    let selector = LabelSelector::for_cluster(name);
    let containers = runtime.list_containers_by_label(&selector).await?;
    let server = containers
        .iter()
        .find_map(|c| {
            let labels = StandardLabels::from_map(&c.labels).ok()?;
            (labels.role == Role::Server).then_some(labels)
        })
        .ok_or_else(|| DiscoveryError::NotFound(name.to_string()))?;

    let url = server.cluster_url;
    let token = server.cluster_token;

    let cluster = crate::domain::Cluster {
        name: name.to_string(),
        nodes: Vec::new(),
        init_node: None,
        server_load_balancer: None,
        network: crate::domain::ClusterNetwork::adopted(name),
        token,
        kube_api: crate::domain::KubeApi::default(),
        image_volume: None,
    };
    Ok(kubeconfig::standalone(&cluster, &url))
}

pub fn write_kubeconfig(
    doc: &kubeconfig::Kubeconfig,
    output: Option<&PathBuf>,
    switch_context: bool,
) -> CommandResult<String> {
    match output {
        None => Ok(kubeconfig::serialize(doc)?),
        Some(path) => {
            let mut existing = kubeconfig::load_from(path)?;
            for cluster in &doc.clusters {
                existing.clusters.retain(|c| c.name != cluster.name);
            }
            existing.clusters.extend(doc.clusters.clone());
            existing.contexts.extend(doc.contexts.clone());
            existing.users.extend(doc.users.clone());
            if switch_context {
                existing.current_context = doc.current_context.clone();
            }
            kubeconfig::save_to(&existing, path)?;
            Ok(format!("merged into {}", path.display()))
        }
    }
}

pub async fn list_registries(runtime: &dyn Runtime) -> CommandResult<Vec<crate::domain::Registry>> {
    Ok(crate::registry::lifecycle::list_existing(runtime).await?)
}

pub async fn delete_registry(runtime: &dyn Runtime, name: &str, force: bool) -> CommandResult<()> {
    let existing = list_registries(runtime).await?;
    let Some(registry) = existing.iter().find(|r| r.name == name) else {
        return Err(CommandError::Discovery(DiscoveryError::NotFound(name.to_string())));
    };
    if !registry.networks.is_empty() && !force {
        for network in &registry.networks {
            runtime.disconnect_network(network, name).await?;
        }
    }
    runtime
        .stop_container(name, Duration::from_secs(10), CancellationToken::new())
        .await?;
    runtime.delete_container(name, CancellationToken::new()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_overrides_expands_dotted_paths() {
        let v = build_overrides(&["servers=3".to_string(), "options.k3d.wait=false".to_string()]).unwrap();
        assert_eq!(v["servers"], Value::Number(3.into()));
        assert_eq!(v["options"]["k3d"]["wait"], Value::Bool(false));
    }

    #[test]
    fn build_overrides_rejects_missing_equals() {
        assert!(build_overrides(&["servers".to_string()]).is_err());
    }

    #[test]
    fn scalarize_prefers_bool_then_number_then_string() {
        assert_eq!(scalarize("true"), Value::Bool(true));
        assert_eq!(scalarize("42"), Value::Number(42.into()));
        assert_eq!(scalarize("demo"), Value::String("demo".to_string()));
    }
}
