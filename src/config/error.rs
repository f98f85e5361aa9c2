//! Errors for the configuration pipeline (§4.1).

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown apiVersion {0:?}")]
    UnknownApiVersion(String),

    #[error("schema validation failed: {0:?}")]
    SchemaViolation(Vec<String>),

    #[error("migration from {from} to {to} failed: {reason}")]
    MigrationFailure {
        from: String,
        to: String,
        reason: String,
    },

    #[error("invalid node filter {0:?}: {1}")]
    InvalidNodeFilter(String, String),

    #[error("node filter {0:?} matched no nodes")]
    FilterNoMatch(String),

    #[error("node filter {0:?} must select exactly one node but matched {1}")]
    FilterAmbiguous(String, usize),

    #[error("duplicate port binding on host port {0}")]
    DuplicatePortBinding(u16),

    #[error("invalid cluster name: {0}")]
    InvalidClusterName(String),

    #[error("failed to read file {path:?} referenced by files[]: {reason}")]
    FileReadFailure { path: String, reason: String },
}
