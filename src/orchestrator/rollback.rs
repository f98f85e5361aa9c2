//! The rollback stack (§4.6): every forward mutation the orchestrator makes
//! pushes an undo action here. On failure the stack unwinds LIFO; rollback
//! itself runs under a detached, shorter-timeout context and never masks
//! the error that triggered it (§5 Cancellation: "rollback during
//! cancellation is ignored").

use std::time::Duration;

use tracing::{error, warn};

use crate::domain::node::Node;
use crate::node_manager::NodeManager;
use crate::runtime::Runtime;

/// Per-action ceiling for rollback's detached context (§5: "its own
/// (shorter) timeout"), shorter than the default node readiness timeout so
/// one stuck daemon call can't stall cleanup indefinitely.
const ROLLBACK_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// One undo-able mutation, recorded in the order it was performed.
pub enum RollbackAction {
    DeleteNode(Node),
    DeleteNetwork { name: String },
    DeleteVolume { name: String },
    DisconnectRegistry { network: String, container: String },
}

impl RollbackAction {
    fn describe(&self) -> String {
        match self {
            RollbackAction::DeleteNode(n) => format!("node {:?}", n.name),
            RollbackAction::DeleteNetwork { name } => format!("network {name:?}"),
            RollbackAction::DeleteVolume { name } => format!("volume {name:?}"),
            RollbackAction::DisconnectRegistry { container, .. } => {
                format!("registry attachment {container:?}")
            }
        }
    }
}

#[derive(Default)]
pub struct RollbackStack {
    actions: Vec<RollbackAction>,
}

impl RollbackStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: RollbackAction) {
        self.actions.push(action);
    }

    /// Unwind every pushed action in LIFO order. Each failure is collected
    /// rather than aborting the unwind, so one stuck object never hides the
    /// rest (§4.6: "rollback errors are logged and aggregated ... never
    /// swallowed"). Returns the names of objects that could not be cleaned
    /// up.
    pub async fn unwind(mut self, runtime: &dyn Runtime) -> Vec<String> {
        let mut leaked = Vec::new();
        // Rollback runs to completion under its own context, independent of
        // whatever cancellation or timeout triggered the failure (§5).
        let manager = NodeManager::new(runtime);

        while let Some(action) = self.actions.pop() {
            let description = action.describe();
            let step = async {
                match action {
                    RollbackAction::DeleteNode(mut node) => {
                        manager.delete(&mut node).await.map_err(|e| e.to_string())
                    }
                    RollbackAction::DeleteNetwork { name } => {
                        runtime.delete_network(&name).await.map_err(|e| e.to_string())
                    }
                    RollbackAction::DeleteVolume { name } => {
                        runtime.delete_volume(&name).await.map_err(|e| e.to_string())
                    }
                    RollbackAction::DisconnectRegistry { network, container } => runtime
                        .disconnect_network(&network, &container)
                        .await
                        .map_err(|e| e.to_string()),
                }
            };
            let result: Result<(), String> =
                match tokio::time::timeout(ROLLBACK_ACTION_TIMEOUT, step).await {
                    Ok(inner) => inner,
                    Err(_) => Err("timed out".to_string()),
                };
            if let Err(reason) = result {
                error!(object = %description, error = %reason, "rollback step failed");
                leaked.push(description);
            } else {
                warn!(object = %description, "rolled back");
            }
        }
        leaked
    }
}
