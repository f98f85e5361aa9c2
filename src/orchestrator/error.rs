//! Errors for the top-level `Run(cfg)` state machine (§4.6, §7).
//!
//! Every variant carries the offending object's identity, per §7
//! "user-visible behavior" — a cluster name, node name, or registry name —
//! so a caller never has to re-derive which object a failure is about.

use thiserror::Error;

use crate::config::ConfigError;
use crate::lb::LbUpdateError;
use crate::node_manager::NodeManagerError;
use crate::registry::RegistryError;
use crate::runtime::RuntimeError;
use crate::tools::ToolsError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] ConfigError),

    #[error("cluster {cluster:?}: {source}")]
    Node {
        cluster: String,
        #[source]
        source: NodeManagerError,
    },

    #[error("cluster {cluster:?}: {source}")]
    Registry {
        cluster: String,
        #[source]
        source: RegistryError,
    },

    #[error("cluster {cluster:?}: load balancer reconfiguration failed: {source}")]
    LoadBalancer {
        cluster: String,
        #[source]
        source: LbUpdateError,
    },

    #[error("cluster {cluster:?}: {source}")]
    Runtime {
        cluster: String,
        #[source]
        source: RuntimeError,
    },

    #[error("cluster {cluster:?}: host/image preparation failed: {source}")]
    Tools {
        cluster: String,
        #[source]
        source: ToolsError,
    },

    #[error("cluster {cluster:?}: post-start hooks failed on {failed:?}")]
    PostStartHooks {
        cluster: String,
        failed: Vec<String>,
    },

    #[error("cluster {cluster:?}: run cancelled before completion")]
    Cancelled { cluster: String },

    #[error(
        "cluster {cluster:?}: rollback after failure left {leaked:?} behind (manual cleanup required): {original}"
    )]
    RollbackFailed {
        cluster: String,
        leaked: Vec<String>,
        original: String,
    },
}

impl OrchestratorError {
    /// §6 exit codes: validation=2, readiness/cancellation=3,
    /// rollback-failed=5, everything else that reached this enum already
    /// triggered a rollback attempt=4. The generic exit code 1 belongs to
    /// `cli::CommandError`, for failures outside this enum entirely (I/O,
    /// discovery, kubeconfig) — every `OrchestratorError` variant is
    /// classified by one of the arms below.
    pub fn exit_code(&self) -> i32 {
        match self {
            OrchestratorError::Validation(_) => 2,
            OrchestratorError::Node {
                source: NodeManagerError::ReadinessTimeout { .. },
                ..
            } => 3,
            OrchestratorError::Cancelled { .. } => 3,
            OrchestratorError::RollbackFailed { .. } => 5,
            _ => 4,
        }
    }
}
