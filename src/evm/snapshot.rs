//! Node state isolation through `evm_snapshot` / `evm_revert`.
use std::{fmt, future::Future, sync::Arc};

use serde_json::{json, Value};
use tracing::{debug, error};

use crate::{
    errors::SimulationError,
    evm::node::{NodeClient, NodeConnection},
};

/// Identifier of a node checkpoint, echoed back to the node verbatim on revert.
///
/// Not `Clone`: a handle is consumed by the one revert it is valid for.
#[derive(Debug, PartialEq)]
pub struct SnapshotId(Value);

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(id) => f.write_str(id),
            other => write!(f, "{other}"),
        }
    }
}

#[derive(Debug)]
pub struct SnapshotManager<N> {
    connection: Arc<NodeConnection<N>>,
}

impl<N: NodeClient> SnapshotManager<N> {
    pub fn new(connection: Arc<NodeConnection<N>>) -> Self {
        Self { connection }
    }

    /// Creates a checkpoint of the node's current state.
    pub async fn create(&self) -> Result<SnapshotId, SimulationError> {
        let id = self
            .connection
            .client()
            .request("evm_snapshot", json!([]))
            .await
            .map_err(|err| {
                if err.is_method_missing() {
                    SimulationError::UnsupportedMethod {
                        method: "evm_snapshot".to_string(),
                        reason: err.to_string(),
                    }
                } else {
                    SimulationError::node("evm_snapshot", err)
                }
            })?;
        if id.is_null() {
            return Err(SimulationError::NodeUnavailable(
                "evm_snapshot returned no snapshot id".to_string(),
            ));
        }
        Ok(SnapshotId(id))
    }

    /// Restores the state captured by `id`.
    pub async fn revert(&self, id: SnapshotId) -> Result<(), SimulationError> {
        let reverted = self
            .connection
            .client()
            .request("evm_revert", json!([id.0]))
            .await
            .map_err(|err| SimulationError::node("evm_revert", err))?;
        match reverted {
            Value::Bool(true) => Ok(()),
            other => Err(SimulationError::NodeUnavailable(format!(
                "evm_revert to snapshot {id} answered {other}"
            ))),
        }
    }

    /// Runs `body` between a snapshot and its revert.
    ///
    /// The revert runs on every path once the snapshot exists. A failed revert is logged and
    /// never replaces the body's own outcome. If the snapshot cannot be created, `body` does not
    /// run at all.
    pub async fn with_snapshot<T, F, Fut>(&self, body: F) -> Result<T, SimulationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SimulationError>>,
    {
        let id = self.create().await?;
        debug!(snapshot = %id, "Snapshot created");
        let label = id.to_string();

        let outcome = body().await;

        match self.revert(id).await {
            Ok(()) => debug!(snapshot = %label, "Snapshot reverted"),
            Err(err) => {
                error!(snapshot = %label, %err, "Failed to revert snapshot, node state leaked")
            }
        }
        outcome
    }
}
