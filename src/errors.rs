//! Simulation errors
use strum_macros::Display;
use thiserror::Error;

/// Failure of a single request against the node, before it is given a meaning by the gateway.
///
/// Variants:
/// - `Transport`: the request never got a JSON-RPC answer (connection refused, timeout, broken
///   pipe). Usually transient.
/// - `Rpc`: the node answered with a JSON-RPC error object.
/// - `Decode`: the node answered, but the payload did not have the expected shape.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Unexpected response: {0}")]
    Decode(String),
}

const METHOD_NOT_FOUND: i64 = -32601;

impl NodeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, NodeError::Transport(_))
    }

    /// Whether the node rejected the request because it does not know the method.
    ///
    /// Nodes disagree on how they report this: geth and reth use the standard `-32601` code,
    /// anvil and hardhat sometimes answer with a generic code and a descriptive message.
    pub fn is_method_missing(&self) -> bool {
        match self {
            NodeError::Rpc { code, message } => {
                let message = message.to_lowercase();
                *code == METHOD_NOT_FOUND ||
                    message.contains("method not found") ||
                    message.contains("not supported") ||
                    message.contains("does not exist") ||
                    message.contains("not available")
            }
            _ => false,
        }
    }
}

/// Represents the user-facing errors of a simulation run.
///
/// A run either succeeds completely or fails with exactly one of these. Per-log and
/// per-trace-node decode problems are never surfaced here; they are skipped where they occur.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// The node could not be reached, or it rejected a method the pipeline cannot run without.
    #[error("Node unavailable: {0}")]
    NodeUnavailable(String),
    /// The node does not implement the snapshot methods.
    #[error("Unsupported method {method}: {reason}")]
    UnsupportedMethod { method: String, reason: String },
    /// Gas estimation failed, which usually means the call would revert.
    #[error("Gas estimation failed: {0}")]
    GasEstimationFailed(String),
    /// The node refused to run the call, or ran it and it reverted.
    #[error("Execution rejected: {0}")]
    ExecutionRejected(String),
    /// The execution was never observed within the configured wait.
    #[error("Receipt for {tx_hash} not available after {waited_ms} ms")]
    ReceiptTimeout { tx_hash: String, waited_ms: u128 },
    /// The requested tracer is not available on the node.
    #[error("Tracing unsupported ({method}): {reason}")]
    TracingUnsupported { method: String, reason: String },
    /// A response that the pipeline depends on could not be decoded.
    #[error("Decode error: {0}")]
    DecodeError(String),
    /// The caller cancelled the run or its deadline elapsed.
    #[error("Simulation cancelled: {0}")]
    Cancelled(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Fieldless mirror of [`SimulationError`], for matching and logging.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NodeUnavailable,
    UnsupportedMethod,
    GasEstimationFailed,
    ExecutionRejected,
    ReceiptTimeout,
    TracingUnsupported,
    DecodeError,
    Cancelled,
    InvalidInput,
}

/// What a failure means for the caller.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// The transaction itself would fail if sent.
    WouldFail,
    /// The transaction may be fine, but its result could not be observed.
    NotObserved,
    /// The requested tracing strategy cannot run on this node.
    TracingUnavailable,
    /// The node is unreachable or lacks required capabilities.
    NodeUnavailable,
    /// The run was stopped by the caller or by bad input.
    Aborted,
}

impl SimulationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimulationError::NodeUnavailable(_) => ErrorKind::NodeUnavailable,
            SimulationError::UnsupportedMethod { .. } => ErrorKind::UnsupportedMethod,
            SimulationError::GasEstimationFailed(_) => ErrorKind::GasEstimationFailed,
            SimulationError::ExecutionRejected(_) => ErrorKind::ExecutionRejected,
            SimulationError::ReceiptTimeout { .. } => ErrorKind::ReceiptTimeout,
            SimulationError::TracingUnsupported { .. } => ErrorKind::TracingUnsupported,
            SimulationError::DecodeError(_) => ErrorKind::DecodeError,
            SimulationError::Cancelled(_) => ErrorKind::Cancelled,
            SimulationError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    pub fn category(&self) -> FailureCategory {
        match self.kind() {
            ErrorKind::GasEstimationFailed | ErrorKind::ExecutionRejected => {
                FailureCategory::WouldFail
            }
            ErrorKind::ReceiptTimeout | ErrorKind::DecodeError => FailureCategory::NotObserved,
            ErrorKind::TracingUnsupported => FailureCategory::TracingUnavailable,
            ErrorKind::NodeUnavailable | ErrorKind::UnsupportedMethod => {
                FailureCategory::NodeUnavailable
            }
            ErrorKind::Cancelled | ErrorKind::InvalidInput => FailureCategory::Aborted,
        }
    }

    /// Maps a node failure on a mandatory pipeline call that has no dedicated error kind.
    pub(crate) fn node(method: &str, err: NodeError) -> Self {
        match err {
            NodeError::Decode(msg) => {
                SimulationError::DecodeError(format!("{method} returned an unexpected value: {msg}"))
            }
            other => SimulationError::NodeUnavailable(format!("{method} failed: {other}")),
        }
    }
}

/// Errors raised while loading [`crate::config::SimulatorConfig`].
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: String, value: String },
}
