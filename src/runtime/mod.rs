//! Runtime abstraction (§4.2) — the only place the orchestrator is allowed
//! to know a container daemon exists. Every operation is label-transparent:
//! whatever labels the caller sets on create are the labels `Get`/`Inspect`
//! hand back, and `List-by-label` is the canonical state inspection
//! mechanism (no in-memory registry is kept between calls).

pub mod archive;
pub mod docker;
pub mod ipam;

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::LabelSelector;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container runtime daemon unavailable: {0}")]
    Unavailable(String),
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: &'static str, name: String },
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },
    #[error("port {0} already in use")]
    PortInUse(u16),
    #[error("network {0:?} not found")]
    NetworkNotFound(String),
    #[error("exec in {container:?} exited {code}: {stderr}")]
    ExecFailed {
        container: String,
        code: i64,
        stderr: String,
    },
    #[error("operation cancelled")]
    Cancelled,
    #[error("daemon error: {0}")]
    Daemon(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    /// The daemon runs directly on this host; container IPs are reachable
    /// from the host without extra plumbing.
    Native,
    /// The daemon runs inside a VM (Docker Desktop on macOS/Windows); the
    /// tools node is used to discover a host address reachable from
    /// containers (§4.7).
    VmBacked,
}

#[derive(Debug, Clone, Default)]
pub struct ContainerCreateSpec {
    pub name: String,
    pub image: String,
    pub cmd: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub volumes: Vec<crate::domain::VolumeMount>,
    pub ports: Vec<crate::domain::PortMapping>,
    /// Networks to attach on create, primary first.
    pub networks: Vec<String>,
    pub memory_limit: Option<String>,
    pub extra_hosts: Vec<crate::domain::ExtraHost>,
    pub privileged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub running: bool,
    pub state: String,
    pub started: Option<DateTime<Utc>>,
    pub labels: HashMap<String, String>,
    /// IP on the container's first-attached network, as reported by the
    /// daemon (the orchestrator picks the primary network's IP from here).
    pub network_ips: HashMap<String, IpAddr>,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkSpec {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub ip_prefix: Option<ipnet::IpNet>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct VolumeSpec {
    pub name: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeHandle {
    pub name: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecSpec {
    pub cmd: Vec<String>,
    pub env: HashMap<String, String>,
    pub workdir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// The narrow capability surface. The orchestrator, node manager, LB
/// synthesizer and tools node depend only on this trait — never on
/// `docker::DockerRuntime` directly (§4.2: "the orchestrator must never
/// reference runtime-specific types").
#[async_trait]
pub trait Runtime: Send + Sync {
    async fn create_container(
        &self,
        spec: ContainerCreateSpec,
        cancel: CancellationToken,
    ) -> Result<ContainerInfo, RuntimeError>;
    async fn start_container(
        &self,
        id: &str,
        cancel: CancellationToken,
    ) -> Result<(), RuntimeError>;
    async fn stop_container(
        &self,
        id: &str,
        grace: Duration,
        cancel: CancellationToken,
    ) -> Result<(), RuntimeError>;
    async fn delete_container(
        &self,
        id: &str,
        cancel: CancellationToken,
    ) -> Result<(), RuntimeError>;
    async fn get_container(&self, name: &str) -> Result<Option<ContainerInfo>, RuntimeError>;
    async fn list_containers_by_label(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<ContainerInfo>, RuntimeError>;
    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo, RuntimeError>;
    async fn rename_container(&self, id: &str, new_name: &str) -> Result<(), RuntimeError>;
    async fn copy_to_container(
        &self,
        id: &str,
        dest_dir: &str,
        tar_archive: Vec<u8>,
    ) -> Result<(), RuntimeError>;
    async fn copy_from_container(&self, id: &str, path: &str) -> Result<Vec<u8>, RuntimeError>;
    async fn exec_one_shot(
        &self,
        id: &str,
        spec: ExecSpec,
        cancel: CancellationToken,
    ) -> Result<ExecOutput, RuntimeError>;
    async fn exec_streaming(
        &self,
        id: &str,
        spec: ExecSpec,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Vec<u8>>, RuntimeError>;
    async fn read_logs(&self, id: &str, tail: Option<usize>) -> Result<Vec<u8>, RuntimeError>;

    async fn create_network_if_absent(
        &self,
        spec: NetworkSpec,
    ) -> Result<NetworkHandle, RuntimeError>;
    async fn connect_network(&self, network: &str, container: &str) -> Result<(), RuntimeError>;
    async fn disconnect_network(
        &self,
        network: &str,
        container: &str,
    ) -> Result<(), RuntimeError>;
    async fn delete_network(&self, network: &str) -> Result<(), RuntimeError>;
    async fn get_network(&self, name: &str) -> Result<Option<NetworkHandle>, RuntimeError>;
    async fn list_networks_by_label(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<NetworkHandle>, RuntimeError>;
    /// Deterministic given the network's persisted IPAM state. Concurrent
    /// callers for the same network must be serialized by the
    /// implementation so no two calls ever return the same address (§4.2,
    /// §5 "IPAM mutations are serialized by the network object's
    /// label-cas").
    async fn allocate_ip(&self, network: &str) -> Result<IpAddr, RuntimeError>;
    async fn release_ip(&self, network: &str, ip: IpAddr) -> Result<(), RuntimeError>;

    async fn create_volume(&self, spec: VolumeSpec) -> Result<VolumeHandle, RuntimeError>;
    async fn delete_volume(&self, name: &str) -> Result<(), RuntimeError>;
    async fn get_volume(&self, name: &str) -> Result<Option<VolumeHandle>, RuntimeError>;
    async fn list_volumes_by_label(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<VolumeHandle>, RuntimeError>;

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;
    async fn pull_image(&self, image: &str, cancel: CancellationToken) -> Result<(), RuntimeError>;
    async fn save_image_to_tar(&self, image: &str) -> Result<Vec<u8>, RuntimeError>;
    async fn load_image_from_tar(&self, tar: Vec<u8>) -> Result<(), RuntimeError>;

    /// Host address reachable *from inside containers* — used to fill
    /// `K3S_URL` when the runtime is VM-backed (§4.7).
    async fn detect_host_address(&self) -> Result<String, RuntimeError>;
    fn kind(&self) -> RuntimeKind;
}
