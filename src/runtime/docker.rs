//! Concrete `Runtime` adapter backed by the local container daemon via
//! `bollard`. This is the one place label maps become bollard's typed
//! request/response structs.

use std::collections::HashMap;
use std::io::Cursor;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, InspectContainerOptions,
    ListContainersOptions, LogsOptions, RemoveContainerOptions, RenameContainerOptions,
    StartContainerOptions, StopContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::{EndpointSettings, HostConfig, Mount, MountTypeEnum, PortBinding};
use bollard::network::{
    ConnectNetworkOptions, CreateNetworkOptions, DisconnectNetworkOptions, InspectNetworkOptions,
    ListNetworksOptions,
};
use bollard::volume::{CreateVolumeOptions, ListVolumesOptions};
use bollard::Docker;
use dashmap::DashMap;
use futures_util::stream::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::LabelSelector;

use super::ipam::next_free_ip;
use super::{
    ContainerCreateSpec, ContainerInfo, ExecOutput, ExecSpec, NetworkHandle, NetworkSpec, Runtime,
    RuntimeError, RuntimeKind, VolumeHandle, VolumeSpec,
};

pub struct DockerRuntime {
    docker: Docker,
    kind: RuntimeKind,
    /// Per-network reservation set serializing `allocate_ip` within this
    /// process (§5; see `runtime::ipam`'s module doc for why a Docker
    /// network label can't be the CAS target instead).
    ip_reservations: DashMap<String, Arc<Mutex<Vec<IpAddr>>>>,
}

impl DockerRuntime {
    /// Connect to the local daemon the way the host's default context
    /// describes it (unix socket on Linux, named pipe on Windows).
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker =
            Docker::connect_with_local_defaults().map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        Ok(Self {
            docker,
            kind: detect_runtime_kind(),
            ip_reservations: DashMap::new(),
        })
    }

    fn filters_map(selector: &LabelSelector) -> HashMap<String, Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), selector.to_filter_strings());
        filters
    }
}

fn detect_runtime_kind() -> RuntimeKind {
    // Docker Desktop on macOS/Windows runs the daemon inside a VM; on Linux
    // the daemon talks to the host network directly.
    if cfg!(target_os = "linux") {
        RuntimeKind::Native
    } else {
        RuntimeKind::VmBacked
    }
}

fn to_runtime_error(kind: &'static str, name: &str, err: bollard::errors::Error) -> RuntimeError {
    match &err {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 404 =>
        {
            RuntimeError::NotFound {
                kind,
                name: name.to_string(),
            }
        }
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 409 =>
        {
            RuntimeError::AlreadyExists {
                kind,
                name: name.to_string(),
            }
        }
        other => RuntimeError::Daemon(other.to_string()),
    }
}

fn container_info_from_inspect(
    name_hint: &str,
    resp: bollard::models::ContainerInspectResponse,
) -> ContainerInfo {
    let id = resp.id.clone().unwrap_or_default();
    let name = resp
        .name
        .clone()
        .unwrap_or_else(|| name_hint.to_string())
        .trim_start_matches('/')
        .to_string();
    let (running, state, started) = match &resp.state {
        Some(s) => {
            let running = s.running.unwrap_or(false);
            let state = s
                .status
                .map(|st| format!("{st:?}"))
                .unwrap_or_default();
            let started = s
                .started_at
                .as_ref()
                .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc));
            (running, state, started)
        }
        None => (false, String::new(), None),
    };
    let labels = resp
        .config
        .as_ref()
        .and_then(|c| c.labels.clone())
        .unwrap_or_default();

    let mut network_ips = HashMap::new();
    if let Some(networks) = resp
        .network_settings
        .as_ref()
        .and_then(|ns| ns.networks.clone())
    {
        for (net_name, endpoint) in networks {
            if let Some(ip) = endpoint.ip_address.as_ref().filter(|s| !s.is_empty()) {
                if let Ok(ip) = ip.parse::<IpAddr>() {
                    network_ips.insert(net_name, ip);
                }
            }
        }
    }

    ContainerInfo {
        id,
        name,
        running,
        state,
        started,
        labels,
        network_ips,
    }
}

#[async_trait]
impl Runtime for DockerRuntime {
    async fn create_container(
        &self,
        spec: ContainerCreateSpec,
        cancel: CancellationToken,
    ) -> Result<ContainerInfo, RuntimeError> {
        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        let port_bindings = build_port_bindings(&spec);
        let mounts = build_mounts(&spec);
        let extra_hosts: Vec<String> = spec
            .extra_hosts
            .iter()
            .map(|h| format!("{}:{}", h.hostname, h.ip))
            .collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            mounts: Some(mounts),
            extra_hosts: Some(extra_hosts),
            memory: spec.memory_limit.as_deref().and_then(parse_memory_bytes),
            privileged: Some(spec.privileged),
            network_mode: spec.networks.first().cloned(),
            ..Default::default()
        };

        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let mut cmd = Vec::new();
        if let Some(c) = &spec.cmd {
            cmd.push(c.clone());
        }
        cmd.extend(spec.args.iter().cloned());

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: if cmd.is_empty() { None } else { Some(cmd) },
            env: Some(env),
            labels: Some(spec.labels.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            result = self.docker.create_container(Some(options), config) => {
                result.map_err(|e| to_runtime_error("container", &spec.name, e))?;
            }
        }

        // Attach any additional (non-primary) networks declared on the spec.
        for extra in spec.networks.iter().skip(1) {
            self.connect_network(extra, &spec.name).await?;
        }
        let _ = EndpointSettings::default(); // networking_config intentionally left to connect_network

        self.inspect_container(&spec.name).await
    }

    async fn start_container(
        &self,
        id: &str,
        cancel: CancellationToken,
    ) -> Result<(), RuntimeError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(RuntimeError::Cancelled),
            result = self.docker.start_container(id, None::<StartContainerOptions<String>>) => {
                result.map_err(|e| to_runtime_error("container", id, e))
            }
        }
    }

    async fn stop_container(
        &self,
        id: &str,
        grace: Duration,
        cancel: CancellationToken,
    ) -> Result<(), RuntimeError> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(RuntimeError::Cancelled),
            result = self.docker.stop_container(id, Some(options)) => {
                result.map_err(|e| to_runtime_error("container", id, e))
            }
        }
    }

    async fn delete_container(
        &self,
        id: &str,
        cancel: CancellationToken,
    ) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(RuntimeError::Cancelled),
            result = self.docker.remove_container(id, Some(options)) => {
                result.map_err(|e| to_runtime_error("container", id, e))
            }
        }
    }

    async fn get_container(&self, name: &str) -> Result<Option<ContainerInfo>, RuntimeError> {
        match self.inspect_container(name).await {
            Ok(info) => Ok(Some(info)),
            Err(RuntimeError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_containers_by_label(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let options = ListContainersOptions {
            all: true,
            filters: Self::filters_map(selector),
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| to_runtime_error("container", "*", e))?;

        let mut out = Vec::with_capacity(summaries.len());
        for summary in summaries {
            if let Some(id) = &summary.id {
                out.push(self.inspect_container(id).await?);
            }
        }
        Ok(out)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo, RuntimeError> {
        let resp = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| to_runtime_error("container", id, e))?;
        Ok(container_info_from_inspect(id, resp))
    }

    async fn rename_container(&self, id: &str, new_name: &str) -> Result<(), RuntimeError> {
        let options = RenameContainerOptions {
            name: new_name.to_string(),
        };
        self.docker
            .rename_container(id, options)
            .await
            .map_err(|e| to_runtime_error("container", id, e))
    }

    async fn copy_to_container(
        &self,
        id: &str,
        dest_dir: &str,
        tar_archive: Vec<u8>,
    ) -> Result<(), RuntimeError> {
        let options = UploadToContainerOptions {
            path: dest_dir.to_string(),
            no_overwrite_dir_non_dir: "false".to_string(),
        };
        self.docker
            .upload_to_container(id, Some(options), tar_archive.into())
            .await
            .map_err(|e| to_runtime_error("container", id, e))
    }

    async fn copy_from_container(&self, id: &str, path: &str) -> Result<Vec<u8>, RuntimeError> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        let mut stream = self.docker.download_from_container(id, Some(options));
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| to_runtime_error("container", id, e))?;
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }

    async fn exec_one_shot(
        &self,
        id: &str,
        spec: ExecSpec,
        cancel: CancellationToken,
    ) -> Result<ExecOutput, RuntimeError> {
        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(spec.cmd.clone()),
                    env: Some(env),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: spec.workdir.clone(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| to_runtime_error("container", id, e))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        if let StartExecResults::Attached { mut output, .. } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| to_runtime_error("container", id, e))?
        {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
                    next = output.next() => {
                        match next {
                            Some(msg) => match msg.map_err(|e| to_runtime_error("container", id, e))? {
                                bollard::container::LogOutput::StdOut { message } => {
                                    stdout.extend_from_slice(&message)
                                }
                                bollard::container::LogOutput::StdErr { message } => {
                                    stderr.extend_from_slice(&message)
                                }
                                _ => {}
                            },
                            None => break,
                        }
                    }
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| to_runtime_error("container", id, e))?;
        let exit_code = inspect.exit_code.unwrap_or(-1);

        Ok(ExecOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    async fn exec_streaming(
        &self,
        id: &str,
        spec: ExecSpec,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Vec<u8>>, RuntimeError> {
        let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(spec.cmd.clone()),
                    env: Some(env),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: spec.workdir.clone(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| to_runtime_error("container", id, e))?;

        let (tx, rx) = mpsc::channel(64);
        if let StartExecResults::Attached { mut output, .. } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| to_runtime_error("container", id, e))?
        {
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        next = output.next() => {
                            match next {
                                Some(Ok(chunk)) => {
                                    let bytes = chunk.into_bytes().to_vec();
                                    if tx.send(bytes).await.is_err() {
                                        break;
                                    }
                                }
                                Some(Err(e)) => {
                                    warn!("exec stream error: {e}");
                                    break;
                                }
                                None => break,
                            }
                        }
                    }
                }
            });
        }
        Ok(rx)
    }

    async fn read_logs(&self, id: &str, tail: Option<usize>) -> Result<Vec<u8>, RuntimeError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.map(|n| n.to_string()).unwrap_or_else(|| "all".into()),
            ..Default::default()
        };
        let mut stream = self.docker.logs(id, Some(options));
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| to_runtime_error("container", id, e))?;
            buf.extend_from_slice(&chunk.into_bytes());
        }
        Ok(buf)
    }

    async fn create_network_if_absent(
        &self,
        spec: NetworkSpec,
    ) -> Result<NetworkHandle, RuntimeError> {
        if let Some(existing) = self.get_network(&spec.name).await? {
            return Ok(existing);
        }

        let labels = spec.labels.clone();
        if let Some(prefix) = &spec.ip_prefix {
            debug!("creating network {} with ipam prefix {prefix}", spec.name);
        }

        let ipam_config = spec.ip_prefix.map(|prefix| bollard::models::Ipam {
            config: Some(vec![bollard::models::IpamConfig {
                subnet: Some(prefix.to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        });

        let options = CreateNetworkOptions {
            name: spec.name.clone(),
            driver: "bridge".to_string(),
            labels,
            ipam: ipam_config.unwrap_or_default(),
            ..Default::default()
        };

        let resp = self
            .docker
            .create_network(options)
            .await
            .map_err(|e| to_runtime_error("network", &spec.name, e))?;

        Ok(NetworkHandle {
            id: resp.id.unwrap_or_default(),
            name: spec.name,
            labels: spec.labels,
        })
    }

    async fn connect_network(&self, network: &str, container: &str) -> Result<(), RuntimeError> {
        let options = ConnectNetworkOptions {
            container: container.to_string(),
            ..Default::default()
        };
        match self.docker.connect_network(network, options).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = to_runtime_error("network", network, e);
                if matches!(err, RuntimeError::AlreadyExists { .. }) {
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn disconnect_network(
        &self,
        network: &str,
        container: &str,
    ) -> Result<(), RuntimeError> {
        let options = DisconnectNetworkOptions {
            container: container.to_string(),
            force: true,
        };
        self.docker
            .disconnect_network(network, options)
            .await
            .map_err(|e| to_runtime_error("network", network, e))
    }

    async fn delete_network(&self, network: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_network(network)
            .await
            .map_err(|e| to_runtime_error("network", network, e))
    }

    async fn get_network(&self, name: &str) -> Result<Option<NetworkHandle>, RuntimeError> {
        match self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(resp) => Ok(Some(NetworkHandle {
                id: resp.id.unwrap_or_default(),
                name: resp.name.unwrap_or_else(|| name.to_string()),
                labels: resp.labels.unwrap_or_default(),
            })),
            Err(e) => match to_runtime_error("network", name, e) {
                RuntimeError::NotFound { .. } => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn list_networks_by_label(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<NetworkHandle>, RuntimeError> {
        let options = ListNetworksOptions {
            filters: Self::filters_map(selector),
        };
        let networks = self
            .docker
            .list_networks(Some(options))
            .await
            .map_err(|e| to_runtime_error("network", "*", e))?;
        Ok(networks
            .into_iter()
            .map(|n| NetworkHandle {
                id: n.id.unwrap_or_default(),
                name: n.name.unwrap_or_default(),
                labels: n.labels.unwrap_or_default(),
            })
            .collect())
    }

    async fn allocate_ip(&self, network: &str) -> Result<IpAddr, RuntimeError> {
        // Docker has no endpoint to update a network's labels after
        // creation, so the label itself can't be the CAS target (see
        // `runtime::ipam`'s module doc). Instead the reservation set for
        // this network lives in-process behind a mutex, seeded each call
        // from the daemon's own view of attached containers so addresses
        // taken outside this process are still respected.
        let slot = self
            .ip_reservations
            .entry(network.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone();
        let mut reserved = slot.lock().await;

        let resp = self
            .docker
            .inspect_network(network, None::<InspectNetworkOptions<String>>)
            .await
            .map_err(|e| to_runtime_error("network", network, e))?;

        let prefix = resp
            .ipam
            .as_ref()
            .and_then(|i| i.config.as_ref())
            .and_then(|c| c.first())
            .and_then(|c| c.subnet.as_ref())
            .and_then(|s| s.parse::<ipnet::IpNet>().ok())
            .ok_or_else(|| {
                RuntimeError::Daemon(format!("network {network} has no IPAM prefix"))
            })?;

        let mut used: Vec<IpAddr> = resp
            .containers
            .unwrap_or_default()
            .values()
            .filter_map(|c| c.ipv4_address.as_deref())
            .filter_map(|cidr| cidr.split('/').next())
            .filter_map(|ip| ip.parse().ok())
            .collect();
        used.extend(reserved.iter().copied());

        let candidate = next_free_ip(&prefix, &used)?;
        reserved.push(candidate);
        Ok(candidate)
    }

    async fn release_ip(&self, network: &str, ip: IpAddr) -> Result<(), RuntimeError> {
        if let Some(slot) = self.ip_reservations.get(network) {
            let mut reserved = slot.value().lock().await;
            reserved.retain(|existing| existing != &ip);
        }
        Ok(())
    }

    async fn create_volume(&self, spec: VolumeSpec) -> Result<VolumeHandle, RuntimeError> {
        let options = CreateVolumeOptions {
            name: spec.name.clone(),
            labels: spec.labels.clone(),
            ..Default::default()
        };
        self.docker
            .create_volume(options)
            .await
            .map_err(|e| to_runtime_error("volume", &spec.name, e))?;
        Ok(VolumeHandle {
            name: spec.name,
            labels: spec.labels,
        })
    }

    async fn delete_volume(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_volume(name, None)
            .await
            .map_err(|e| to_runtime_error("volume", name, e))
    }

    async fn get_volume(&self, name: &str) -> Result<Option<VolumeHandle>, RuntimeError> {
        match self.docker.inspect_volume(name).await {
            Ok(resp) => Ok(Some(VolumeHandle {
                name: resp.name,
                labels: resp.labels,
            })),
            Err(e) => match to_runtime_error("volume", name, e) {
                RuntimeError::NotFound { .. } => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn list_volumes_by_label(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<VolumeHandle>, RuntimeError> {
        let options = ListVolumesOptions {
            filters: Self::filters_map(selector),
        };
        let resp = self
            .docker
            .list_volumes(Some(options))
            .await
            .map_err(|e| to_runtime_error("volume", "*", e))?;
        Ok(resp
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| VolumeHandle {
                name: v.name,
                labels: v.labels,
            })
            .collect())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![image.to_string()]);
        let options = ListImagesOptions {
            filters,
            ..Default::default()
        };
        let images = self
            .docker
            .list_images(Some(options))
            .await
            .map_err(|e| to_runtime_error("image", image, e))?;
        Ok(!images.is_empty())
    }

    async fn pull_image(&self, image: &str, cancel: CancellationToken) -> Result<(), RuntimeError> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
                next = stream.next() => {
                    match next {
                        Some(Ok(info)) => {
                            if let Some(status) = info.status {
                                debug!("pull {image}: {status}");
                            }
                        }
                        Some(Err(e)) => return Err(to_runtime_error("image", image, e)),
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    async fn save_image_to_tar(&self, image: &str) -> Result<Vec<u8>, RuntimeError> {
        let mut stream = self.docker.export_image(image);
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| to_runtime_error("image", image, e))?;
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }

    async fn load_image_from_tar(&self, tar: Vec<u8>) -> Result<(), RuntimeError> {
        let mut stream = self.docker.import_image(
            bollard::image::ImportImageOptions::default(),
            Cursor::new(tar).into_inner().to_vec().into(),
            None,
        );
        while let Some(chunk) = stream.next().await {
            chunk.map_err(|e| to_runtime_error("image", "<tar>", e))?;
        }
        Ok(())
    }

    async fn detect_host_address(&self) -> Result<String, RuntimeError> {
        match self.kind {
            RuntimeKind::Native => Ok("172.17.0.1".to_string()),
            // On VM-backed runtimes the tools node resolves this from
            // inside the container network (§4.7); this fallback is the
            // Docker Desktop convention.
            RuntimeKind::VmBacked => Ok("host.docker.internal".to_string()),
        }
    }

    fn kind(&self) -> RuntimeKind {
        self.kind
    }
}

fn build_port_bindings(spec: &ContainerCreateSpec) -> HashMap<String, Option<Vec<PortBinding>>> {
    let mut map: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    for p in &spec.ports {
        let proto = match p.protocol {
            crate::domain::Protocol::Tcp => "tcp",
            crate::domain::Protocol::Udp => "udp",
        };
        let key = format!("{}/{proto}", p.container_port);
        let binding = PortBinding {
            host_ip: p.host_ip.clone(),
            host_port: p.host_port.map(|hp| hp.to_string()),
        };
        map.entry(key).or_insert_with(|| Some(Vec::new()));
        if let Some(Some(bindings)) = map.get_mut(&format!("{}/{proto}", p.container_port)) {
            bindings.push(binding);
        }
    }
    map
}

fn build_mounts(spec: &ContainerCreateSpec) -> Vec<Mount> {
    spec.volumes
        .iter()
        .map(|v| {
            let is_bind = v.source.starts_with('/') || v.source.starts_with('.');
            Mount {
                target: Some(v.target.clone()),
                source: Some(v.source.clone()),
                typ: Some(if is_bind {
                    MountTypeEnum::BIND
                } else {
                    MountTypeEnum::VOLUME
                }),
                read_only: Some(v.read_only),
                ..Default::default()
            }
        })
        .collect()
}

fn parse_memory_bytes(raw: &str) -> Option<i64> {
    let raw = raw.trim().to_lowercase();
    let (digits, multiplier) = if let Some(n) = raw.strip_suffix('g') {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = raw.strip_suffix('m') {
        (n, 1024 * 1024)
    } else if let Some(n) = raw.strip_suffix('k') {
        (n, 1024)
    } else {
        (raw.as_str(), 1)
    };
    digits.parse::<i64>().ok().map(|n| n * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_memory_suffixes() {
        assert_eq!(parse_memory_bytes("2g"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_memory_bytes("512m"), Some(512 * 1024 * 1024));
        assert_eq!(parse_memory_bytes("bogus"), None);
    }
}
