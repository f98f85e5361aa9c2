//! The load-balancer synthesizer (§4.4): a pure function from cluster
//! membership and port bindings to a deterministic, byte-identical proxy
//! config document, plus the protocol for pushing a new one to a running
//! `serverlb` container.

mod config_doc;
mod update;

pub use config_doc::{synthesize, LbConfigDoc};
pub use update::{reload, LbUpdateError, CONFIG_FILE_NAME, CONFIG_PATH_DIR};
