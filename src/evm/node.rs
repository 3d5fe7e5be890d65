//! Access to the JSON-RPC node the simulations run against.
//!
//! `NodeClient` is the single seam between the crate and the network. Everything above it speaks
//! in typed requests and results; everything below it is raw JSON.
use alloy::{
    providers::{Provider, ProviderBuilder, RootProvider},
    transports::{BoxTransport, RpcError, TransportErrorKind},
};
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::errors::{NodeError, SimulationError};

/// Sends raw JSON-RPC requests to a node.
#[allow(async_fn_in_trait)]
pub trait NodeClient: Send + Sync {
    /// Performs one request/response round-trip. `params` is the positional parameter array.
    async fn request(&self, method: &str, params: Value) -> Result<Value, NodeError>;
}

pub type BoxedProvider = RootProvider<BoxTransport>;

/// A `NodeClient` backed by an alloy provider.
#[derive(Clone, Debug)]
pub struct RpcNode<P> {
    provider: P,
}

impl RpcNode<BoxedProvider> {
    /// Connects to `url`. Accepts `http(s)://`, `ws(s)://` and IPC paths.
    pub async fn connect(url: &str) -> Result<Self, SimulationError> {
        let provider = ProviderBuilder::new()
            .on_builtin(url)
            .await
            .map_err(|e| {
                SimulationError::NodeUnavailable(format!("Failed to connect to {url}: {e}"))
            })?;
        info!(%url, "Connected to node");
        Ok(Self { provider })
    }
}

impl<P> RpcNode<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P> NodeClient for RpcNode<P>
where
    P: Provider<BoxTransport> + Send + Sync,
{
    async fn request(&self, method: &str, params: Value) -> Result<Value, NodeError> {
        debug!(method, "Sending request");
        match self
            .provider
            .raw_request::<_, Value>(method.to_string().into(), params)
            .await
        {
            Ok(value) => Ok(value),
            Err(RpcError::NullResp) => Ok(Value::Null),
            Err(err) => Err(convert_rpc_error(err)),
        }
    }
}

fn convert_rpc_error(err: RpcError<TransportErrorKind>) -> NodeError {
    match err {
        RpcError::ErrorResp(payload) => {
            NodeError::Rpc { code: payload.code, message: payload.message.to_string() }
        }
        RpcError::DeserError { err, text } => {
            NodeError::Decode(format!("{err} while decoding {text}"))
        }
        RpcError::SerError(err) => NodeError::Decode(err.to_string()),
        other => NodeError::Transport(other.to_string()),
    }
}

/// A node client together with the lane that serializes simulations on it.
///
/// Node snapshots form one global stack per node, so two simulations interleaving their
/// snapshot/revert pairs would revert each other's state. Every simulation holds the lane for
/// its whole duration; simulations that must run in parallel need separate nodes.
#[derive(Debug)]
pub struct NodeConnection<N> {
    client: N,
    lane: Mutex<()>,
}

impl<N: NodeClient> NodeConnection<N> {
    pub fn new(client: N) -> Self {
        Self { client, lane: Mutex::new(()) }
    }

    pub fn client(&self) -> &N {
        &self.client
    }

    /// Waits until no other simulation runs on this connection.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lane.lock().await
    }
}
