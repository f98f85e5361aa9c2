//! Host-IP discovery (§4.7): fills `K3S_URL`'s host component when the
//! container daemon runs inside a VM and `localhost` from the host isn't
//! reachable from containers. On a native daemon the runtime itself
//! already knows the answer; only the VM-backed case needs an ephemeral
//! probe container.

use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::runtime::{ContainerCreateSpec, ExecSpec, Runtime, RuntimeKind};

use super::error::ToolsError;

const TOOLS_IMAGE: &str = "ghcr.io/k3cluster/tools:latest";

/// Discover the address containers should use to reach this host.
pub async fn discover(runtime: &dyn Runtime) -> Result<String, ToolsError> {
    if runtime.kind() == RuntimeKind::Native {
        return Ok(runtime.detect_host_address().await?);
    }
    probe_via_tools_container(runtime).await
}

async fn probe_via_tools_container(runtime: &dyn Runtime) -> Result<String, ToolsError> {
    let name = format!("k3cluster-tools-{}", uuid::Uuid::new_v4());
    let spec = ContainerCreateSpec {
        name: name.clone(),
        image: TOOLS_IMAGE.to_string(),
        cmd: Some("sleep".to_string()),
        args: vec!["300".to_string()],
        env: HashMap::new(),
        labels: HashMap::new(),
        volumes: Vec::new(),
        ports: Vec::new(),
        networks: Vec::new(),
        memory_limit: None,
        extra_hosts: Vec::new(),
        privileged: false,
    };

    let info = runtime.create_container(spec, CancellationToken::new()).await?;
    runtime.start_container(&info.id, CancellationToken::new()).await?;

    let result = tokio::time::timeout(
        exec_timeout(),
        runtime.exec_one_shot(
            &info.id,
            ExecSpec {
                cmd: vec![
                    "sh".into(),
                    "-c".into(),
                    "getent hosts host.docker.internal || ip route show default | awk '/default/ {print $3}'".into(),
                ],
                env: HashMap::new(),
                workdir: None,
            },
            CancellationToken::new(),
        ),
    )
    .await;

    runtime
        .delete_container(&info.id, CancellationToken::new())
        .await
        .ok();

    let output = match result {
        Ok(inner) => inner?,
        Err(_) => {
            return Err(ToolsError::HostAddressUndiscoverable(
                "probe container exec timed out".to_string(),
            ))
        }
    };
    if output.exit_code != 0 {
        return Err(ToolsError::HostAddressUndiscoverable(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let address = stdout
        .split_whitespace()
        .last()
        .ok_or_else(|| ToolsError::HostAddressUndiscoverable("probe produced no output".to_string()))?
        .to_string();
    Ok(address)
}

/// Bound on how long the probe container's `sh -c` discovery command is
/// allowed to run before the probe is abandoned.
fn exec_timeout() -> Duration {
    Duration::from_secs(10)
}
