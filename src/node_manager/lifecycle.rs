//! The node lifecycle manager (§4.5): drives one [`Node`] through
//! `Planned → Reserved → Provisioned → Running → Ready`, rolling back on
//! any forward failure (§4.6). `delete` is the only operation that moves a
//! node to `Deleted` and is idempotent against a node that is already gone.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::labels::StandardLabels;
use crate::domain::node::{HookStage, Node, Phase};
use crate::runtime::{ContainerCreateSpec, Runtime};

use super::error::NodeManagerError;
use super::hooks;
use super::readiness;

/// Cluster-wide facts a node needs to join — deliberately narrow so the
/// node manager never has to import the whole `Cluster` aggregate.
#[derive(Debug, Clone)]
pub struct JoinContext {
    pub cluster_name: String,
    pub cluster_url: String,
    pub cluster_token: String,
    pub registry_host: Option<String>,
}

pub struct NodeManager<'a> {
    runtime: &'a dyn Runtime,
    /// When true, a failed pre-start hook aborts the node instead of
    /// warning and continuing (§9 Open Question 1).
    pub strict_hooks: bool,
}

impl<'a> NodeManager<'a> {
    pub fn new(runtime: &'a dyn Runtime) -> Self {
        Self {
            runtime,
            strict_hooks: false,
        }
    }

    pub fn with_strict_hooks(mut self, strict: bool) -> Self {
        self.strict_hooks = strict;
        self
    }

    /// Reserve an IP on the node's primary network (`Planned → Reserved`).
    pub async fn reserve(&self, node: &mut Node) -> Result<(), NodeManagerError> {
        let Some(network) = node.primary_network().map(str::to_string) else {
            node.phase = Phase::Reserved;
            return Ok(());
        };
        let ip = self.runtime.allocate_ip(&network).await?;
        node.extra_hosts.push(crate::domain::node::ExtraHost {
            hostname: node.name.clone(),
            ip: ip.to_string(),
        });
        node.phase = Phase::Reserved;
        Ok(())
    }

    /// Create the container, attached but not started (`Reserved → Provisioned`).
    pub async fn provision(&self, node: &mut Node, ctx: &JoinContext) -> Result<(), NodeManagerError> {
        let mut labels = StandardLabels::new(
            ctx.cluster_name.clone(),
            node.role,
            ctx.cluster_url.clone(),
            ctx.cluster_token.clone(),
        );
        if let Some(host) = &ctx.registry_host {
            labels = labels.with_registry_host(host.clone());
        }
        let mut label_map = labels.to_map();
        label_map.extend(node.runtime_labels.clone());

        let mut env = node.env.clone();
        if node.role.is_k3s_node() {
            env.entry("K3S_TOKEN".to_string()).or_insert_with(|| ctx.cluster_token.clone());
            env.entry("K3S_URL".to_string()).or_insert_with(|| ctx.cluster_url.clone());
        }

        let cmd = node.cmd.clone().or_else(|| {
            node.role.is_k3s_node().then(|| node.role.label_value().to_string())
        });

        let networks = node
            .networks
            .iter()
            .map(|n| n.name.clone())
            .collect::<Vec<_>>();

        let spec = ContainerCreateSpec {
            name: node.name.clone(),
            image: node.image.clone(),
            cmd,
            args: node.args.clone(),
            env,
            labels: label_map,
            volumes: node.volumes.clone(),
            ports: node.ports.clone(),
            networks,
            memory_limit: node.memory_limit.clone(),
            extra_hosts: node.extra_hosts.clone(),
            privileged: node.role.is_k3s_node(),
        };

        let info = self
            .runtime
            .create_container(spec, CancellationToken::new())
            .await?;
        node.runtime_id = Some(info.id);
        node.phase = Phase::Provisioned;
        Ok(())
    }

    /// Run pre-start hooks, start the container (`Provisioned → Running`).
    pub async fn start(&self, node: &mut Node, cancel: CancellationToken) -> Result<(), NodeManagerError> {
        let container_id = node
            .runtime_id
            .clone()
            .ok_or_else(|| NodeManagerError::NotProvisioned(node.name.clone()))?;

        for hook in node.hooks_for(HookStage::PreStart).cloned().collect::<Vec<_>>() {
            if let Err(e) = hooks::apply(self.runtime, &container_id, &hook.action).await {
                let description = hook.action.description();
                if self.strict_hooks {
                    return Err(NodeManagerError::PreStartHookFailed {
                        node: node.name.clone(),
                        description,
                        reason: e.to_string(),
                    });
                }
                warn!(node = %node.name, hook = %description, error = %e, "pre-start hook failed, continuing");
            }
        }

        self.runtime.start_container(&container_id, cancel).await?;
        node.phase = Phase::Running;
        info!(node = %node.name, "container started");
        Ok(())
    }

    /// Poll the node's readiness probe (`Running → Ready`).
    pub async fn wait_ready(
        &self,
        node: &mut Node,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<(), NodeManagerError> {
        let container_id = node
            .runtime_id
            .clone()
            .ok_or_else(|| NodeManagerError::NotProvisioned(node.name.clone()))?;
        readiness::wait_ready(self.runtime, &container_id, &node.name, node.role, timeout, cancel).await?;
        node.phase = Phase::Ready;
        Ok(())
    }

    /// Run post-start hooks best-effort: every hook runs even if an
    /// earlier one fails, and all failures are returned together (§9 Open
    /// Question 3 — the orchestrator aggregates these across nodes).
    pub async fn post_start_hooks(&self, node: &Node) -> Vec<NodeManagerError> {
        let mut failures = Vec::new();
        let Some(container_id) = node.runtime_id.clone() else {
            return failures;
        };
        for hook in node.hooks_for(HookStage::PostStart) {
            if let Err(e) = hooks::apply(self.runtime, &container_id, &hook.action).await {
                failures.push(NodeManagerError::PostStartHookFailed {
                    node: node.name.clone(),
                    description: hook.action.description(),
                    reason: e.to_string(),
                });
            }
        }
        failures
    }

    /// Stop, delete and release the node's IP. Idempotent: a node with no
    /// `runtime_id` (never provisioned) is a no-op.
    pub async fn delete(&self, node: &mut Node) -> Result<(), NodeManagerError> {
        let Some(container_id) = node.runtime_id.clone() else {
            node.phase = Phase::Deleted;
            return Ok(());
        };
        self.runtime
            .stop_container(&container_id, Duration::from_secs(10), CancellationToken::new())
            .await
            .ok();
        self.runtime
            .delete_container(&container_id, CancellationToken::new())
            .await?;
        if let (Some(network), Some(ip)) = (
            node.primary_network().map(str::to_string),
            node.extra_hosts.iter().find(|h| h.hostname == node.name).map(|h| h.ip.clone()),
        ) {
            if let Ok(addr) = ip.parse() {
                self.runtime.release_ip(&network, addr).await.ok();
            }
        }
        node.phase = Phase::Deleted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_context_carries_registry_host_optionally() {
        let ctx = JoinContext {
            cluster_name: "demo".into(),
            cluster_url: "https://demo-server-0:6443".into(),
            cluster_token: "tok".into(),
            registry_host: None,
        };
        assert!(ctx.registry_host.is_none());
    }
}
