//! Errors for the tools node (§4.7).

use thiserror::Error;

use crate::runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum ToolsError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("could not determine a host address reachable from containers: {0}")]
    HostAddressUndiscoverable(String),
}
