//! Cluster re-discovery (§6 "Persisted state: None ... re-discovery of a
//! cluster consists entirely of listing containers by label and
//! reconstructing the aggregate"). This is the only place outside the
//! orchestrator that queries the runtime directly — it backs every CLI
//! command that isn't `create` (`list`, `get`, `delete`, `start`, `stop`,
//! kubeconfig lookups), none of which has a `TransformOutput` to work
//! from.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::labels::{LabelError, StandardLabels, LABEL_APP, PRODUCT};
use crate::domain::{LabelSelector, Role};
use crate::runtime::{ContainerInfo, Runtime, RuntimeError};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("container {container:?} carries a malformed label set: {source}")]
    BadLabels {
        container: String,
        #[source]
        source: LabelError,
    },

    #[error("cluster {0:?} not found")]
    NotFound(String),
}

/// A node as reconstructed from a single container's labels and observed
/// state — everything the CLI needs to print, nothing the orchestrator
/// needs to resume a `Run`.
#[derive(Debug, Clone)]
pub struct NodeSummary {
    pub name: String,
    pub role: Role,
    pub runtime_id: String,
    pub running: bool,
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct ClusterSummary {
    pub name: String,
    pub nodes: Vec<NodeSummary>,
}

impl ClusterSummary {
    pub fn server_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.role == Role::Server).count()
    }

    pub fn agent_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.role == Role::Agent).count()
    }

    pub fn has_load_balancer(&self) -> bool {
        self.nodes.iter().any(|n| n.role == Role::LoadBalancer)
    }
}

fn node_summary(container: ContainerInfo) -> Result<NodeSummary, DiscoveryError> {
    let labels = StandardLabels::from_map(&container.labels).map_err(|e| DiscoveryError::BadLabels {
        container: container.name.clone(),
        source: e,
    })?;
    Ok(NodeSummary {
        name: container.name,
        role: labels.role,
        runtime_id: container.id,
        running: container.running,
        state: container.state,
    })
}

/// Group every container this system owns by its `cluster` label,
/// reconstructing one [`ClusterSummary`] per distinct cluster name
/// (§8 invariant 1 holds on the way in: a container missing a mandatory
/// label is reported rather than silently dropped).
pub async fn list_clusters(runtime: &dyn Runtime) -> Result<Vec<ClusterSummary>, DiscoveryError> {
    let selector = LabelSelector::new().with(crate::domain::labels::LABEL_APP, crate::domain::labels::PRODUCT);
    let containers = runtime.list_containers_by_label(&selector).await?;

    let mut by_cluster: std::collections::BTreeMap<String, Vec<NodeSummary>> =
        std::collections::BTreeMap::new();
    for container in containers {
        // Registry containers carry the standard labels but are not owned
        // by any one cluster; they're discovered separately (§4.3).
        let cluster = container
            .labels
            .get(crate::domain::labels::LABEL_CLUSTER)
            .cloned();
        let Some(cluster) = cluster else { continue };
        let summary = node_summary(container)?;
        if summary.role == Role::Registry {
            continue;
        }
        by_cluster.entry(cluster).or_default().push(summary);
    }

    let mut clusters: Vec<ClusterSummary> = by_cluster
        .into_iter()
        .map(|(name, mut nodes)| {
            nodes.sort_by(|a, b| a.name.cmp(&b.name));
            ClusterSummary { name, nodes }
        })
        .collect();
    clusters.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(clusters)
}

pub async fn get_cluster(
    runtime: &dyn Runtime,
    name: &str,
) -> Result<ClusterSummary, DiscoveryError> {
    let selector = LabelSelector::for_cluster(name);
    let containers = runtime.list_containers_by_label(&selector).await?;
    if containers.is_empty() {
        return Err(DiscoveryError::NotFound(name.to_string()));
    }
    let mut nodes = containers
        .into_iter()
        .map(node_summary)
        .collect::<Result<Vec<_>, _>>()?;
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(ClusterSummary {
        name: name.to_string(),
        nodes,
    })
}

/// Start every node container belonging to `cluster`, in no particular
/// order — unlike `create`, a `start` on an already-provisioned cluster
/// has no InitNode/join ordering left to honor (§4.4 readiness was
/// satisfied the first time the cluster came up).
pub async fn start_cluster(runtime: &dyn Runtime, name: &str) -> Result<usize, DiscoveryError> {
    let cluster = get_cluster(runtime, name).await?;
    let mut started = 0;
    for node in &cluster.nodes {
        runtime
            .start_container(&node.runtime_id, CancellationToken::new())
            .await?;
        started += 1;
    }
    Ok(started)
}

/// Stop every node container belonging to `cluster` with the given grace
/// period, LB first so in-flight requests drain before the servers they
/// front go down.
pub async fn stop_cluster(
    runtime: &dyn Runtime,
    name: &str,
    grace: Duration,
) -> Result<usize, DiscoveryError> {
    let mut cluster = get_cluster(runtime, name).await?;
    cluster.nodes.sort_by_key(|n| match n.role {
        Role::LoadBalancer => 0,
        Role::Agent => 1,
        Role::Server => 2,
        Role::Registry => 3,
    });
    let mut stopped = 0;
    for node in &cluster.nodes {
        runtime
            .stop_container(&node.runtime_id, grace, CancellationToken::new())
            .await?;
        stopped += 1;
    }
    Ok(stopped)
}

/// Delete every node belonging to `cluster`, then its network (unless
/// adopted — re-derived here from the network's own `external` label
/// rather than assumed, since discovery has no `TransformOutput` to
/// consult) and image volume. Mirrors [`crate::orchestrator::RollbackStack`]
/// but runs forward rather than as an undo, and is invoked directly by the
/// CLI rather than the orchestrator. Errors on individual objects are
/// collected rather than aborting, so one stuck container doesn't block
/// the rest of the teardown (§7: rollback/cleanup errors are aggregated,
/// never swallowed).
pub async fn delete_cluster(runtime: &dyn Runtime, name: &str) -> Result<Vec<String>, DiscoveryError> {
    let cluster = get_cluster(runtime, name).await?;
    let mut failed = Vec::new();

    for node in &cluster.nodes {
        if let Err(e) = runtime
            .stop_container(&node.runtime_id, Duration::from_secs(10), CancellationToken::new())
            .await
        {
            failed.push(format!("stop {}: {}", node.name, e));
        }
        if let Err(e) = runtime
            .delete_container(&node.runtime_id, CancellationToken::new())
            .await
        {
            failed.push(format!("delete {}: {}", node.name, e));
        }
    }

    // An adopted (external) network never carries our own `app` label —
    // it was never passed through `create_network_if_absent` with our
    // labels, only looked up (§4.6 Rollback: "never [delete] if adopted").
    // That absence, not a dedicated flag, is what distinguishes it once
    // a fresh process has nothing but label queries to go on (§6).
    let network_selector = LabelSelector::for_cluster(name);
    if let Ok(networks) = runtime.list_networks_by_label(&network_selector).await {
        for network in networks {
            let owned_by_us = network.labels.get(LABEL_APP).map(String::as_str) == Some(PRODUCT);
            if !owned_by_us {
                continue;
            }
            if let Err(e) = runtime.delete_network(&network.name).await {
                failed.push(format!("delete network {}: {}", network.name, e));
            }
        }
    }

    if let Ok(volumes) = runtime.list_volumes_by_label(&network_selector).await {
        for volume in volumes {
            if let Err(e) = runtime.delete_volume(&volume.name).await {
                failed.push(format!("delete volume {}: {}", volume.name, e));
            }
        }
    }

    Ok(failed)
}
