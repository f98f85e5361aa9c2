//! Role-specific readiness probes (§3 `readiness_kind`, §4.5, §9 design
//! note: event-driven polling replacing an arbitrary fixed sleep).
//!
//! Each probe is a short in-container exec, retried on a backoff until it
//! either succeeds or the deadline passes.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::domain::role::Role;
use crate::runtime::{ExecSpec, Runtime};

use super::error::NodeManagerError;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn probe_command(role: Role) -> Vec<String> {
    match role {
        Role::Server => vec![
            "sh".into(),
            "-c".into(),
            "kubectl get --raw='/readyz' --kubeconfig=/etc/rancher/k3s/k3s.yaml".into(),
        ],
        Role::Agent => vec![
            "sh".into(),
            "-c".into(),
            "test -S /run/k3s/containerd/containerd.sock".into(),
        ],
        Role::LoadBalancer => vec!["sh".into(), "-c".into(), "test -f /etc/confd/conf.d/values.yaml".into()],
        Role::Registry => vec![
            "wget".into(),
            "-q".into(),
            "-O".into(),
            "/dev/null".into(),
            "http://localhost:5000/v2/".into(),
        ],
    }
}

/// Poll `node_name`'s readiness command until it exits 0 or `timeout`
/// elapses, whichever comes first.
pub async fn wait_ready(
    runtime: &dyn Runtime,
    container_id: &str,
    node_name: &str,
    role: Role,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<(), NodeManagerError> {
    let deadline = Instant::now() + timeout;
    let cmd = probe_command(role);
    let mut last_reason = String::new();

    loop {
        if cancel.is_cancelled() {
            return Err(NodeManagerError::Cancelled(node_name.to_string()));
        }
        let attempt = runtime
            .exec_one_shot(
                container_id,
                ExecSpec {
                    cmd: cmd.clone(),
                    env: Default::default(),
                    workdir: None,
                },
                cancel.clone(),
            )
            .await;

        match attempt {
            Ok(output) if output.exit_code == 0 => return Ok(()),
            Ok(output) => {
                last_reason = format!(
                    "probe exited {}: {}",
                    output.exit_code,
                    String::from_utf8_lossy(&output.stderr)
                );
            }
            Err(e) => last_reason = e.to_string(),
        }

        if Instant::now() >= deadline {
            return Err(NodeManagerError::ReadinessTimeout {
                node: node_name.to_string(),
                elapsed_secs: timeout.as_secs(),
                reason: last_reason,
            });
        }
        sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_has_a_distinct_probe() {
        let commands: Vec<_> = [Role::Server, Role::Agent, Role::LoadBalancer, Role::Registry]
            .into_iter()
            .map(probe_command)
            .collect();
        for i in 0..commands.len() {
            for j in (i + 1)..commands.len() {
                assert_ne!(commands[i], commands[j]);
            }
        }
    }
}
