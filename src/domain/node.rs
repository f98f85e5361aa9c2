//! Node — the atomic unit (§3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::role::Role;

/// Forward progress of a single entity (§3 Lifecycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Planned,
    Reserved,
    Provisioned,
    Running,
    Ready,
    Stopped,
    Deleted,
}

/// A host port ↔ container port mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_ip: Option<String>,
    pub host_port: Option<u16>,
    pub container_port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Tcp
    }
}

/// A volume or bind mount attached to a node's container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Named volume or absolute host path.
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

/// A network this node is attached to. `primary` selects the network whose
/// IP becomes the node's observed address — selected explicitly by role,
/// never by list position (Design Notes: "only-first-network handling").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    pub name: String,
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraHost {
    pub hostname: String,
    pub ip: String,
}

/// When a hook runs relative to the container's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookStage {
    PreStart,
    PostStart,
}

/// A transformation applied to an existing file by `RewriteFile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileTransform {
    /// Replace every occurrence of `from` with `to`.
    ReplaceAll { from: String, to: String },
    /// Append a line if not already present.
    AppendLineIfMissing(String),
    /// Deep-merge a YAML document into the existing one (used for
    /// `registries.yaml`, §4.3 Config mode — user keys win on conflict).
    MergeYaml(serde_yaml::Value),
}

/// One lifecycle hook action (§3, §9 "first-class typed records").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookAction {
    WriteFile {
        path: String,
        content: Vec<u8>,
        mode: u32,
        description: String,
    },
    RewriteFile {
        path: String,
        transform: FileTransform,
    },
}

impl HookAction {
    pub fn description(&self) -> String {
        match self {
            HookAction::WriteFile { description, .. } => description.clone(),
            HookAction::RewriteFile { path, .. } => format!("rewrite {path}"),
        }
    }
}

/// A single ordered hook: stage + action, scoped to one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hook {
    pub stage: HookStage,
    pub action: HookAction,
}

/// Observed container state as last read from the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    pub running: bool,
    pub state: String,
    pub started: Option<DateTime<Utc>>,
}

/// The atomic unit: one container in a cluster (or a standalone registry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub role: Role,
    pub runtime_id: Option<String>,

    pub image: String,
    pub cmd: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub volumes: Vec<VolumeMount>,
    pub ports: Vec<PortMapping>,
    pub networks: Vec<NetworkAttachment>,
    pub memory_limit: Option<String>,
    pub extra_hosts: Vec<ExtraHost>,
    pub runtime_labels: HashMap<String, String>,
    pub k3s_node_labels: HashMap<String, String>,

    pub hooks: Vec<Hook>,

    pub phase: Phase,
    pub observed: ObservedState,
}

impl Node {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        let image = role.default_image().to_string();
        Self {
            name: name.into(),
            role,
            runtime_id: None,
            image,
            cmd: None,
            args: Vec::new(),
            env: HashMap::new(),
            volumes: Vec::new(),
            ports: Vec::new(),
            networks: Vec::new(),
            memory_limit: None,
            extra_hosts: Vec::new(),
            runtime_labels: HashMap::new(),
            k3s_node_labels: HashMap::new(),
            hooks: Vec::new(),
            phase: Phase::Planned,
            observed: ObservedState::default(),
        }
    }

    pub fn primary_network(&self) -> Option<&str> {
        self.networks
            .iter()
            .find(|n| n.primary)
            .map(|n| n.name.as_str())
    }

    pub fn hooks_for(&self, stage: HookStage) -> impl Iterator<Item = &Hook> {
        self.hooks.iter().filter(move |h| h.stage == stage)
    }

    pub fn push_hook(&mut self, stage: HookStage, action: HookAction) {
        self.hooks.push(Hook { stage, action });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_starts_planned_with_role_default_image() {
        let n = Node::new("demo-server-0", Role::Server);
        assert_eq!(n.phase, Phase::Planned);
        assert_eq!(n.image, Role::Server.default_image());
    }

    #[test]
    fn primary_network_selected_by_flag_not_position() {
        let mut n = Node::new("demo-agent-0", Role::Agent);
        n.networks.push(NetworkAttachment {
            name: "extra".into(),
            primary: false,
        });
        n.networks.push(NetworkAttachment {
            name: "demo".into(),
            primary: true,
        });
        assert_eq!(n.primary_network(), Some("demo"));
    }

    #[test]
    fn hooks_filter_by_stage_preserving_order() {
        let mut n = Node::new("demo-server-0", Role::Server);
        n.push_hook(
            HookStage::PreStart,
            HookAction::WriteFile {
                path: "/a".into(),
                content: vec![],
                mode: 0o644,
                description: "a".into(),
            },
        );
        n.push_hook(
            HookStage::PostStart,
            HookAction::WriteFile {
                path: "/b".into(),
                content: vec![],
                mode: 0o644,
                description: "b".into(),
            },
        );
        n.push_hook(
            HookStage::PreStart,
            HookAction::WriteFile {
                path: "/c".into(),
                content: vec![],
                mode: 0o644,
                description: "c".into(),
            },
        );
        let pre: Vec<_> = n
            .hooks_for(HookStage::PreStart)
            .map(|h| h.action.description())
            .collect();
        assert_eq!(pre, vec!["a", "c"]);
    }
}
