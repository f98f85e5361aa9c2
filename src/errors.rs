//! The crate-wide error aggregate. Every component boundary has its own
//! `thiserror` enum (`ConfigError`, `RuntimeError`, `OrchestratorError`, …);
//! this type exists only for callers that want one `Result` to match on
//! without importing every subsystem's error module.

use thiserror::Error;

use crate::config::ConfigError;
use crate::orchestrator::OrchestratorError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

impl Error {
    /// §6 exit codes. Config errors are always validation failures (2);
    /// everything else defers to the orchestrator's own classification.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 2,
            Error::Orchestrator(e) => e.exit_code(),
        }
    }
}
