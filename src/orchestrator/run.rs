//! The top-level `Run(cfg)` state machine (§4.6): Plan is the caller's job
//! (see [`crate::config::load`]); this module picks up from Prepare and
//! carries the cluster through Create, Start & Configure, Wait and Commit,
//! unwinding the rollback stack on any failure in between.

use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::TransformOutput;
use crate::domain::node::{
    FileTransform, Hook, HookAction, HookStage, NetworkAttachment, Node, PortMapping, Protocol,
};
use crate::domain::registry::{Registry, RegistryLifecycle};
use crate::domain::role::Role;
use crate::lb;
use crate::node_manager::{JoinContext, NodeManager, NodeManagerError};
use crate::registry::{self, hosting_configmap};
use crate::runtime::Runtime;
use crate::tools::ImagePullCache;

use super::error::OrchestratorError;
use super::prepare::{self, PreparedCluster};
use super::rollback::{RollbackAction, RollbackStack};

/// Tunables that aren't part of the domain model but shape how a run
/// behaves — all sourced from `options.k3d` (§6).
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub ready_timeout: Duration,
    pub strict_hooks: bool,
    pub wait: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(60),
            strict_hooks: false,
            wait: true,
        }
    }
}

/// What a successful `Run` hands back — everything `Commit` needs plus the
/// finished cluster for a caller that wants to inspect it further.
pub struct RunOutcome {
    pub cluster: crate::domain::cluster::Cluster,
    pub kube_api_url: String,
}

fn registries_yaml_value(registries: &[Registry]) -> serde_yaml::Value {
    let mirrors: serde_yaml::Mapping = registries
        .iter()
        .map(|r| {
            let mut entry = serde_yaml::Mapping::new();
            entry.insert(
                serde_yaml::Value::String("endpoint".into()),
                serde_yaml::Value::Sequence(vec![serde_yaml::Value::String(format!(
                    "http://{}",
                    r.endpoint()
                ))]),
            );
            (
                serde_yaml::Value::String(r.name.clone()),
                serde_yaml::Value::Mapping(entry),
            )
        })
        .collect();
    let mut root = serde_yaml::Mapping::new();
    root.insert(
        serde_yaml::Value::String("mirrors".into()),
        serde_yaml::Value::Mapping(mirrors),
    );
    serde_yaml::Value::Mapping(root)
}

/// Attach the `registries.yaml` mirror hook and, when at least one registry
/// is in play, the `local-registry-hosting` manifest hook, to every k3s
/// node (§4.3, scenario S3).
fn attach_registry_hooks(nodes: &mut [Node], registries: &[Registry]) {
    if registries.is_empty() {
        return;
    }
    let mirrors_hook = Hook {
        stage: HookStage::PreStart,
        action: HookAction::RewriteFile {
            path: "/etc/rancher/k3s/registries.yaml".to_string(),
            transform: FileTransform::MergeYaml(registries_yaml_value(registries)),
        },
    };
    let manifest_action = hosting_configmap::write_manifest_hook(registries);
    for node in nodes.iter_mut().filter(|n| n.role.is_k3s_node()) {
        // Inserted at the front rather than pushed: hooks run in
        // `node.hooks` order and a `MergeYaml` hook's payload is the
        // merge *overlay* over whatever's already on disk, so whichever
        // hook runs last wins a conflicting key. The auto-generated
        // mirror must act as the base underneath any user-authored
        // `registries.config` hook transform.rs already attached, not
        // override it (§4.3: user keys win on conflict).
        if node.role == Role::Server {
            node.hooks.insert(
                0,
                Hook {
                    stage: HookStage::PreStart,
                    action: manifest_action.clone(),
                },
            );
        }
        node.hooks.insert(0, mirrors_hook.clone());
    }
}

fn node_error(cluster: &str, e: NodeManagerError) -> OrchestratorError {
    OrchestratorError::Node {
        cluster: cluster.to_string(),
        source: e,
    }
}

/// Walk one node through `Planned → Ready`. On any failure the node's
/// state as observed so far (in particular `runtime_id`, if provisioning
/// got that far) is returned alongside the error so the caller can still
/// register it for rollback.
async fn create_start_wait(
    manager: &NodeManager<'_>,
    mut node: Node,
    ctx: &JoinContext,
    timeout: Duration,
    cancel: CancellationToken,
) -> (Node, Result<(), OrchestratorError>) {
    let result = async {
        manager.reserve(&mut node).await.map_err(|e| node_error(&ctx.cluster_name, e))?;
        manager
            .provision(&mut node, ctx)
            .await
            .map_err(|e| node_error(&ctx.cluster_name, e))?;
        manager
            .start(&mut node, cancel.clone())
            .await
            .map_err(|e| node_error(&ctx.cluster_name, e))?;
        manager
            .wait_ready(&mut node, timeout, cancel)
            .await
            .map_err(|e| node_error(&ctx.cluster_name, e))?;
        Ok(())
    }
    .await;
    if result.is_ok() {
        info!(node = %node.name, "ready");
    }
    (node, result)
}

/// Register a node for rollback if it reached a state the runtime actually
/// knows about (i.e. the container was created), whether or not the rest
/// of its pipeline succeeded.
fn register_if_provisioned(node: &Node, rollback: &mut RollbackStack) {
    if node.runtime_id.is_some() {
        rollback.push(RollbackAction::DeleteNode(node.clone()));
    }
}

async fn create_registry(
    runtime: &dyn Runtime,
    manager: &NodeManager<'_>,
    registry: &Registry,
    network: &str,
    ctx: &JoinContext,
    timeout: Duration,
    cancel: CancellationToken,
    rollback: &mut RollbackStack,
) -> Result<(), OrchestratorError> {
    let cluster = ctx.cluster_name.clone();
    match registry.lifecycle {
        RegistryLifecycle::External => {
            runtime
                .connect_network(network, &registry.name)
                .await
                .map_err(|e| OrchestratorError::Runtime {
                    cluster: cluster.clone(),
                    source: e,
                })?;
            rollback.push(RollbackAction::DisconnectRegistry {
                network: network.to_string(),
                container: registry.name.clone(),
            });
            Ok(())
        }
        RegistryLifecycle::Owned => {
            let mut node = Node::new(registry.name.clone(), Role::Registry);
            node.image = registry.image.clone();
            node.networks.push(NetworkAttachment {
                name: network.to_string(),
                primary: true,
            });
            if registry.host_port != 0 {
                node.ports.push(PortMapping {
                    host_ip: None,
                    host_port: Some(registry.host_port),
                    container_port: 5000,
                    protocol: Protocol::Tcp,
                });
            }
            registry::prepare_node(&mut node, registry);
            let (finished, result) = create_start_wait(manager, node, ctx, timeout, cancel).await;
            register_if_provisioned(&finished, rollback);
            result
        }
    }
}

/// Execute the full Plan→Prepare→Create→Start&Configure→Wait→Commit
/// sequence for a freshly transformed cluster. `plan` is consumed: nodes
/// gain registry hooks and runtime ids as the run progresses.
pub async fn run(
    runtime: &dyn Runtime,
    mut plan: TransformOutput,
    options: RunOptions,
    cancel: CancellationToken,
) -> Result<RunOutcome, OrchestratorError> {
    let cluster_name = plan.cluster.name.clone();
    let mut rollback = RollbackStack::new();
    let pull_cache = ImagePullCache::new();

    let prepared: PreparedCluster =
        match prepare::prepare(runtime, &plan, &pull_cache, &mut rollback).await {
            Ok(p) => p,
            Err(e) => {
                let leaked = rollback.unwind(runtime).await;
                return Err(finish_with_rollback(e, &cluster_name, leaked));
            }
        };

    let kube_api_url = format!(
        "https://{}:{}",
        prepared.host_address, plan.cluster.kube_api.host_port
    );

    let ctx = JoinContext {
        cluster_name: cluster_name.clone(),
        cluster_url: kube_api_url.clone(),
        cluster_token: plan.cluster.token.clone(),
        registry_host: prepared.registries.first().map(|r| r.endpoint()),
    };

    attach_registry_hooks(&mut plan.cluster.nodes, &prepared.registries);

    let manager = NodeManager::new(runtime).with_strict_hooks(options.strict_hooks);

    let result = run_nodes(runtime, &manager, &mut plan, &prepared, &ctx, &options, cancel, &mut rollback).await;

    match result {
        Ok(()) => Ok(RunOutcome {
            cluster: plan.cluster,
            kube_api_url,
        }),
        Err(e) => {
            let leaked = rollback.unwind(runtime).await;
            Err(finish_with_rollback(e, &cluster_name, leaked))
        }
    }
}

fn finish_with_rollback(original: OrchestratorError, cluster: &str, leaked: Vec<String>) -> OrchestratorError {
    if leaked.is_empty() {
        original
    } else {
        OrchestratorError::RollbackFailed {
            cluster: cluster.to_string(),
            leaked,
            original: original.to_string(),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_nodes(
    runtime: &dyn Runtime,
    manager: &NodeManager<'_>,
    plan: &mut TransformOutput,
    prepared: &PreparedCluster,
    ctx: &JoinContext,
    options: &RunOptions,
    cancel: CancellationToken,
    rollback: &mut RollbackStack,
) -> Result<(), OrchestratorError> {
    // Registries first: owned registries must exist and external ones must
    // be attached before any node's pre-start hooks reference them.
    for registry in &prepared.registries {
        create_registry(
            runtime,
            manager,
            registry,
            &prepared.network_name,
            ctx,
            options.ready_timeout,
            cancel.clone(),
            rollback,
        )
        .await?;
    }

    let init_name = plan.cluster.init_node.clone();

    if let Some(name) = &init_name {
        replace_node(plan, name, |node| {
            create_start_wait(manager, node, ctx, options.ready_timeout, cancel.clone())
        })
        .await?;
        register_if_provisioned(plan.cluster.node(name).expect("just replaced"), rollback);
    }

    // Init-node Ready happens-before everything else, but once it is, all
    // remaining servers and all agents are created in parallel together
    // (§5, scenario S2) — agents don't wait on the other servers.
    let remaining_names: Vec<String> = plan
        .cluster
        .servers()
        .filter(|n| Some(&n.name) != init_name.as_ref())
        .map(|n| n.name.clone())
        .chain(plan.cluster.agents().map(|n| n.name.clone()))
        .collect();
    run_parallel(manager, plan, &remaining_names, ctx, options, cancel.clone(), rollback).await?;

    if let Some(lb_name) = plan.cluster.server_load_balancer.clone() {
        let doc = lb::synthesize(&plan.cluster);
        if let Some(node) = plan.cluster.nodes.iter_mut().find(|n| n.name == lb_name) {
            node.push_hook(
                HookStage::PreStart,
                HookAction::WriteFile {
                    path: format!("{}/{}", lb::CONFIG_PATH_DIR, lb::CONFIG_FILE_NAME),
                    content: doc.to_bytes(),
                    mode: 0o644,
                    description: "write initial load balancer config".to_string(),
                },
            );
        }
        replace_node(plan, &lb_name, |node| {
            create_start_wait(manager, node, ctx, options.ready_timeout, cancel.clone())
        })
        .await?;
        register_if_provisioned(plan.cluster.node(&lb_name).expect("just replaced"), rollback);
    }

    run_post_start_hooks(manager, plan).await?;

    info!(cluster = %ctx.cluster_name, "cluster ready");
    Ok(())
}

/// Take a node out of the cluster by name, run `f` on an owned copy, and
/// put the (possibly partially-provisioned) result back — regardless of
/// whether `f` succeeded, so rollback can still see `runtime_id`.
async fn replace_node<F, Fut>(
    plan: &mut TransformOutput,
    name: &str,
    f: F,
) -> Result<(), OrchestratorError>
where
    F: FnOnce(Node) -> Fut,
    Fut: std::future::Future<Output = (Node, Result<(), OrchestratorError>)>,
{
    let index = plan
        .cluster
        .nodes
        .iter()
        .position(|n| n.name == name)
        .expect("name drawn from the cluster's own node list");
    let node = plan.cluster.nodes.remove(index);
    let (finished, result) = f(node).await;
    plan.cluster.nodes.insert(index, finished);
    result
}

#[allow(clippy::too_many_arguments)]
async fn run_parallel(
    manager: &NodeManager<'_>,
    plan: &mut TransformOutput,
    names: &[String],
    ctx: &JoinContext,
    options: &RunOptions,
    cancel: CancellationToken,
    rollback: &mut RollbackStack,
) -> Result<(), OrchestratorError> {
    if names.is_empty() {
        return Ok(());
    }

    let nodes: Vec<Node> = names
        .iter()
        .map(|name| {
            plan.cluster
                .nodes
                .iter()
                .find(|n| &n.name == name)
                .cloned()
                .expect("name drawn from the cluster's own node list")
        })
        .collect();

    let futures = nodes
        .into_iter()
        .map(|node| create_start_wait(manager, node, ctx, options.ready_timeout, cancel.clone()));
    let outcomes = join_all(futures).await;

    let mut first_err = None;
    for (finished, result) in outcomes {
        register_if_provisioned(&finished, rollback);
        if let Some(slot) = plan.cluster.nodes.iter_mut().find(|n| n.name == finished.name) {
            *slot = finished;
        }
        if let Err(e) = result {
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn run_post_start_hooks(manager: &NodeManager<'_>, plan: &TransformOutput) -> Result<(), OrchestratorError> {
    let mut failed = Vec::new();
    for node in &plan.cluster.nodes {
        let failures = manager.post_start_hooks(node).await;
        if !failures.is_empty() {
            for f in failures {
                warn!(node = %node.name, error = %f, "post-start hook failed");
            }
            failed.push(node.name.clone());
        }
    }
    if failed.is_empty() {
        Ok(())
    } else {
        Err(OrchestratorError::PostStartHooks {
            cluster: plan.cluster.name.clone(),
            failed,
        })
    }
}
