//! Node-facing half of the simulator: the JSON-RPC client, state isolation and the decoders that
//! turn receipts and traces into transfers.
pub mod gateway;
pub mod logs;
#[cfg(test)]
pub(crate) mod mock_node;
pub mod node;
pub mod simulation;
pub mod snapshot;
pub mod token;
pub mod traces;
