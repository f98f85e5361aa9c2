//! The Prepare stage (§4.6 step 2): create or adopt the network, the image
//! volume and any owned registries, pre-pull images, and discover a
//! host address for the init container's `K3S_URL` when the runtime is
//! VM-backed. Every mutation here pushes its undo onto the rollback stack
//! before moving on, so a failure partway through still unwinds cleanly.

use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::config::TransformOutput;
use crate::domain::labels::{LABEL_APP, LABEL_CLUSTER, PRODUCT};
use crate::domain::network::Ipam;
use crate::domain::registry::Registry;
use crate::registry;
use crate::runtime::{NetworkSpec, Runtime, VolumeSpec};
use crate::tools::{self, ImagePullCache};

use super::error::OrchestratorError;
use super::rollback::{RollbackAction, RollbackStack};

fn cluster_labels(cluster: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    labels.insert(LABEL_APP.to_string(), PRODUCT.to_string());
    labels.insert(LABEL_CLUSTER.to_string(), cluster.to_string());
    labels
}

/// Everything Create needs that Plan alone couldn't determine.
pub struct PreparedCluster {
    pub network_name: String,
    pub host_address: String,
    pub registries: Vec<Registry>,
}

fn cluster_error(cluster: &str, source: crate::runtime::RuntimeError) -> OrchestratorError {
    OrchestratorError::Runtime {
        cluster: cluster.to_string(),
        source,
    }
}

pub async fn prepare(
    runtime: &dyn Runtime,
    plan: &TransformOutput,
    pull_cache: &ImagePullCache,
    rollback: &mut RollbackStack,
) -> Result<PreparedCluster, OrchestratorError> {
    let cluster_name = plan.cluster.name.as_str();

    let network_spec = NetworkSpec {
        name: plan.cluster.network.name.clone(),
        labels: cluster_labels(cluster_name),
        ip_prefix: match &plan.cluster.network.ipam {
            Ipam { managed: true, ip_prefix, .. } => ip_prefix.clone(),
            _ => None,
        },
    };
    runtime
        .create_network_if_absent(network_spec)
        .await
        .map_err(|e| cluster_error(cluster_name, e))?;
    if !plan.cluster.network.external {
        rollback.push(RollbackAction::DeleteNetwork {
            name: plan.cluster.network.name.clone(),
        });
    }

    if let Some(volume_name) = &plan.cluster.image_volume {
        runtime
            .create_volume(VolumeSpec {
                name: volume_name.clone(),
                labels: cluster_labels(cluster_name),
            })
            .await
            .map_err(|e| cluster_error(cluster_name, e))?;
        rollback.push(RollbackAction::DeleteVolume {
            name: volume_name.clone(),
        });
    }

    let existing = registry::list_existing(runtime)
        .await
        .map_err(|e| OrchestratorError::Registry {
            cluster: cluster_name.to_string(),
            source: e,
        })?;

    let (owned, used): (Vec<_>, Vec<_>) = plan
        .registries
        .iter()
        .cloned()
        .partition(|r| !r.is_external());

    registry::check_use_references(&existing, &used).map_err(|e| OrchestratorError::Registry {
        cluster: cluster_name.to_string(),
        source: e,
    })?;

    for candidate in &owned {
        registry::check_collision(&existing, candidate).map_err(|e| OrchestratorError::Registry {
            cluster: cluster_name.to_string(),
            source: e,
        })?;
    }

    let mut images: HashSet<String> = plan
        .cluster
        .nodes
        .iter()
        .map(|n| n.image.clone())
        .collect();
    for registry in &owned {
        images.insert(registry.image.clone());
    }
    for image in &images {
        pull_cache
            .ensure_pulled(runtime, image, tokio_util::sync::CancellationToken::new())
            .await
            .map_err(|e| cluster_error(cluster_name, e))?;
    }

    let host_address = tools::discover(runtime)
        .await
        .map_err(|e| OrchestratorError::Tools {
            cluster: cluster_name.to_string(),
            source: e,
        })?;

    info!(cluster = %cluster_name, network = %plan.cluster.network.name, "prepared");

    Ok(PreparedCluster {
        network_name: plan.cluster.network.name.clone(),
        host_address,
        registries: plan.registries.clone(),
    })
}
