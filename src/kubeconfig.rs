//! Kubeconfig emission (§4.6 Commit, §6): a standard kubeconfig document for
//! the finished cluster, either printed to stdout or merged into a
//! user-designated file. Parsing/merging are pure functions; only
//! [`load_from`] and [`save_to`] touch disk (Design Notes: "the only
//! disk/env I/O boundary outside the runtime adapter" pattern applied to
//! this concern too).

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::cluster::Cluster;

#[derive(Debug, Error)]
pub enum KubeconfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("failed to write {path}: {reason}")]
    Write { path: String, reason: String },
    #[error("failed to parse kubeconfig: {0}")]
    Parse(String),
    #[error("failed to serialize kubeconfig: {0}")]
    Serialize(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEntry {
    pub server: String,
    #[serde(rename = "insecure-skip-tls-verify", default)]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserEntry,
}

/// The on-disk document shape (a subset of the upstream kubeconfig schema:
/// just enough to reach this cluster's API server with its join token).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub clusters: Vec<NamedCluster>,
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context", skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,
    pub users: Vec<NamedUser>,
}

impl Default for Kubeconfig {
    fn default() -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: Vec::new(),
            contexts: Vec::new(),
            current_context: None,
            users: Vec::new(),
        }
    }
}

fn context_name(cluster_name: &str) -> String {
    format!("k3cluster-{cluster_name}")
}

/// Build the entries for one cluster. `server` is the externally-reachable
/// API URL (§4.6 `kube_api_url`); the bearer token is the cluster join
/// token, which k3s also accepts for API access.
pub fn entries_for_cluster(cluster: &Cluster, server: &str) -> (NamedCluster, NamedContext, NamedUser) {
    let name = context_name(&cluster.name);
    let cluster_entry = NamedCluster {
        name: name.clone(),
        cluster: ClusterEntry {
            server: server.to_string(),
            insecure_skip_tls_verify: true,
        },
    };
    let context_entry = NamedContext {
        name: name.clone(),
        context: ContextEntry {
            cluster: name.clone(),
            user: name.clone(),
        },
    };
    let user_entry = NamedUser {
        name: name.clone(),
        user: UserEntry {
            token: cluster.token.clone(),
        },
    };
    (cluster_entry, context_entry, user_entry)
}

/// Build a standalone kubeconfig document for a single cluster.
pub fn standalone(cluster: &Cluster, server: &str) -> Kubeconfig {
    let (c, ctx, u) = entries_for_cluster(cluster, server);
    let name = c.name.clone();
    Kubeconfig {
        api_version: "v1".to_string(),
        kind: "Config".to_string(),
        clusters: vec![c],
        contexts: vec![ctx],
        current_context: Some(name),
        users: vec![u],
    }
}

/// Merge this cluster's entries into an existing document, replacing any
/// prior entry under the same name (re-running `create` on the same
/// cluster updates its kubeconfig entry rather than duplicating it).
/// `switch_current_context` mirrors `options.kubeconfig.switchCurrentContext`.
pub fn merge(doc: &mut Kubeconfig, cluster: &Cluster, server: &str, switch_current_context: bool) {
    let (c, ctx, u) = entries_for_cluster(cluster, server);
    let name = c.name.clone();

    upsert(&mut doc.clusters, name.clone(), c, |e| &e.name);
    upsert(&mut doc.contexts, name.clone(), ctx, |e| &e.name);
    upsert(&mut doc.users, name.clone(), u, |e| &e.name);

    if switch_current_context || doc.current_context.is_none() {
        doc.current_context = Some(name);
    }
}

fn upsert<T>(items: &mut Vec<T>, name: String, value: T, key: impl Fn(&T) -> &String) {
    if let Some(slot) = items.iter_mut().find(|item| key(item) == &name) {
        *slot = value;
    } else {
        items.push(value);
    }
}

pub fn parse(content: &str) -> Result<Kubeconfig, KubeconfigError> {
    serde_yaml::from_str(content).map_err(|e| KubeconfigError::Parse(e.to_string()))
}

pub fn serialize(doc: &Kubeconfig) -> Result<String, KubeconfigError> {
    serde_yaml::to_string(doc).map_err(|e| KubeconfigError::Serialize(e.to_string()))
}

/// Default kubeconfig path (`~/.kube/config`), consistent with how the
/// rest of the crate locates user-level files via `dirs`.
pub fn default_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kube")
        .join("config")
}

pub fn load_from(path: &Path) -> Result<Kubeconfig, KubeconfigError> {
    if !path.exists() {
        return Ok(Kubeconfig::default());
    }
    let content = std::fs::read_to_string(path).map_err(|e| KubeconfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse(&content)
}

/// Write `doc` to `path` atomically: serialize to a sibling temp file,
/// flush, then rename over the destination (§5: "Kubeconfig file writes
/// are atomic via temp-file + rename").
pub fn save_to(doc: &Kubeconfig, path: &Path) -> Result<(), KubeconfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| KubeconfigError::Write {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    }
    let content = serialize(doc)?;
    let tmp_path = path.with_extension("tmp-k3cluster");
    {
        let mut tmp = std::fs::File::create(&tmp_path).map_err(|e| KubeconfigError::Write {
            path: tmp_path.display().to_string(),
            reason: e.to_string(),
        })?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| KubeconfigError::Write {
                path: tmp_path.display().to_string(),
                reason: e.to_string(),
            })?;
        tmp.sync_all().ok();
    }
    std::fs::rename(&tmp_path, path).map_err(|e| KubeconfigError::Write {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::KubeApi;
    use crate::domain::network::ClusterNetwork;

    fn demo_cluster() -> Cluster {
        Cluster {
            name: "demo".into(),
            nodes: vec![],
            init_node: None,
            server_load_balancer: None,
            network: ClusterNetwork::adopted("demo"),
            token: "tok".into(),
            kube_api: KubeApi::default(),
            image_volume: None,
        }
    }

    #[test]
    fn standalone_sets_current_context() {
        let doc = standalone(&demo_cluster(), "https://127.0.0.1:6443");
        assert_eq!(doc.current_context.as_deref(), Some("k3cluster-demo"));
        assert_eq!(doc.clusters[0].cluster.server, "https://127.0.0.1:6443");
    }

    #[test]
    fn merge_replaces_existing_entry_for_same_cluster() {
        let mut doc = standalone(&demo_cluster(), "https://127.0.0.1:6443");
        merge(&mut doc, &demo_cluster(), "https://127.0.0.1:7443", false);
        assert_eq!(doc.clusters.len(), 1);
        assert_eq!(doc.clusters[0].cluster.server, "https://127.0.0.1:7443");
    }

    #[test]
    fn merge_preserves_other_clusters() {
        let mut doc = Kubeconfig::default();
        let mut other = demo_cluster();
        other.name = "other".into();
        merge(&mut doc, &other, "https://127.0.0.1:6443", true);
        merge(&mut doc, &demo_cluster(), "https://127.0.0.1:7443", false);
        assert_eq!(doc.clusters.len(), 2);
        assert_eq!(doc.current_context.as_deref(), Some("k3cluster-other"));
    }

    #[test]
    fn save_and_load_round_trip_through_a_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        let doc = standalone(&demo_cluster(), "https://127.0.0.1:6443");
        save_to(&doc, &path).unwrap();
        let back = load_from(&path).unwrap();
        assert_eq!(back.current_context, doc.current_context);
    }
}
