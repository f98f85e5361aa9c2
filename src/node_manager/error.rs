//! Errors for the node lifecycle manager (§4.5).

use thiserror::Error;

use crate::runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum NodeManagerError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("pre-start hook {description:?} on {node:?} failed: {reason}")]
    PreStartHookFailed {
        node: String,
        description: String,
        reason: String,
    },

    #[error("post-start hook {description:?} on {node:?} failed: {reason}")]
    PostStartHookFailed {
        node: String,
        description: String,
        reason: String,
    },

    #[error("{node:?} did not become ready within {elapsed_secs}s: {reason}")]
    ReadinessTimeout {
        node: String,
        elapsed_secs: u64,
        reason: String,
    },

    #[error("operation on {0:?} was cancelled")]
    Cancelled(String),

    #[error("node {0:?} has no runtime id; it was never provisioned")]
    NotProvisioned(String),
}
