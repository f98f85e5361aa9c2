//! The update protocol (§4.4): serialize → diff against what's deployed →
//! `CopyTo` → `ExecOneShot` reload → check exit code. A no-op when the
//! synthesized document is unchanged, so reconciliation passes that find
//! nothing new never touch the running load balancer.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::runtime::archive::{build_file_tar, read_first_file};
use crate::runtime::{ExecSpec, Runtime, RuntimeError};

use super::config_doc::LbConfigDoc;

pub const CONFIG_PATH_DIR: &str = "/etc/confd/conf.d";
pub const CONFIG_FILE_NAME: &str = "values.yaml";

#[derive(Debug, Error)]
pub enum LbUpdateError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("reload command in {container:?} exited {code}: {stderr}")]
    ReloadFailed {
        container: String,
        code: i64,
        stderr: String,
    },
}

/// Push `doc` to the `serverlb` container identified by `container_id` and
/// trigger its config reload, skipping the round trip entirely if the
/// currently-deployed document already matches.
pub async fn reload(
    runtime: &dyn Runtime,
    container_id: &str,
    doc: &LbConfigDoc,
    cancel: CancellationToken,
) -> Result<bool, LbUpdateError> {
    let new_bytes = doc.to_bytes();

    let current = runtime
        .copy_from_container(
            container_id,
            &format!("{CONFIG_PATH_DIR}/{CONFIG_FILE_NAME}"),
        )
        .await
        .ok()
        .and_then(|tar| read_first_file(&tar));

    if current.as_deref() == Some(new_bytes.as_slice()) {
        return Ok(false);
    }

    let tar_archive = build_file_tar(CONFIG_FILE_NAME, &new_bytes);
    runtime
        .copy_to_container(container_id, CONFIG_PATH_DIR, tar_archive)
        .await?;

    let output = runtime
        .exec_one_shot(
            container_id,
            ExecSpec {
                cmd: vec!["kill".into(), "-HUP".into(), "1".into()],
                env: Default::default(),
                workdir: None,
            },
            cancel,
        )
        .await?;

    if output.exit_code != 0 {
        return Err(LbUpdateError::ReloadFailed {
            container: container_id.to_string(),
            code: output.exit_code,
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_under_confd() {
        assert_eq!(CONFIG_PATH_DIR, "/etc/confd/conf.d");
    }
}
