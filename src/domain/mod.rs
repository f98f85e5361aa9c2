//! Domain model (§3) — pure data. Entities, roles, labels, statuses.
//!
//! Nothing in this module talks to a runtime or parses configuration; it is
//! the shared vocabulary every other component builds on.

pub mod cluster;
pub mod labels;
pub mod network;
pub mod node;
pub mod registry;
pub mod role;

pub use cluster::{
    validate_cluster_name, Cluster, ClusterInvariantError, ClusterNameError, KubeApi,
};
pub use labels::{LabelError, LabelSelector, StandardLabels};
pub use network::{ClusterNetwork, Ipam};
pub use node::{
    ExtraHost, FileTransform, Hook, HookAction, HookStage, NetworkAttachment, Node, ObservedState,
    Phase, PortMapping, Protocol, VolumeMount,
};
pub use registry::{ProxyConfig, Registry, RegistryLifecycle};
pub use role::Role;
