//! Errors for the registry subsystem (§4.3).

use thiserror::Error;

use crate::runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("a registry named {0:?} already exists")]
    NameCollision(String),

    #[error("a registry already publishes host port {0}")]
    HostPortCollision(u16),

    #[error("referenced registry {0:?} does not exist; create it first or remove it from `use`")]
    ReferencedRegistryMissing(String),
}
