//! Typed wrappers around the node methods the simulation pipeline relies on.
//!
//! Every method here turns a raw [`NodeError`] into the [`SimulationError`] kind that the
//! failing stage implies, so callers can branch on what went wrong rather than on how the node
//! phrased it.
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use alloy::rpc::types::{TransactionInput, TransactionRequest};
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{
    config::SimulatorConfig,
    errors::{NodeError, SimulationError},
    evm::{
        logs::TRANSFER_TOPIC,
        node::{NodeClient, NodeConnection},
        traces::{positive_transfer, TraceResponse},
    },
    models::{NativeTransfer, SimulationRequest, TraceStrategy},
    retry::retry_async,
    serde_helpers::{quantity, quantity_option, quantity_u128_option, to_quantity},
};

pub const TRACE_METHOD: &str = "trace_transaction";
pub const DEBUG_TRACE_METHOD: &str = "debug_traceTransaction";

/// The parts of a transaction receipt the pipeline reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    /// `1` for success, `0` for a reverted execution. Absent on pre-Byzantium receipts.
    #[serde(default, with = "quantity_option")]
    pub status: Option<u64>,
    #[serde(with = "quantity")]
    pub gas_used: u64,
    /// Raw log objects, decoded one by one by the log analyzer.
    #[serde(default)]
    pub logs: Vec<Value>,
}

/// The parts of a transaction object the pipeline reads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionInfo {
    pub hash: B256,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: U256,
    /// Absent on nodes that only report EIP-1559 fee fields.
    #[serde(default, rename = "gasPrice", with = "quantity_u128_option")]
    pub gas_price: Option<u128>,
}

impl TransactionInfo {
    /// The native transfer carried by the transaction's value field, if it moves any value.
    pub fn value_transfer(&self) -> Option<NativeTransfer> {
        positive_transfer(self.from, self.to, Some(self.value))
    }
}

/// Issues the pipeline's JSON-RPC calls against one node connection.
#[derive(Debug)]
pub struct RpcGateway<N> {
    connection: Arc<NodeConnection<N>>,
    receipt_timeout: Duration,
    receipt_poll_interval: Duration,
    read_attempts: usize,
    read_retry_delay: Duration,
}

impl<N: NodeClient> RpcGateway<N> {
    pub fn new(connection: Arc<NodeConnection<N>>, config: &SimulatorConfig) -> Self {
        Self {
            connection,
            receipt_timeout: config.receipt_timeout,
            receipt_poll_interval: config.receipt_poll_interval,
            read_attempts: config.metadata_attempts.max(1),
            read_retry_delay: config.metadata_retry_delay,
        }
    }

    #[cfg(test)]
    pub(crate) fn client(&self) -> &N {
        self.connection.client()
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, NodeError> {
        self.connection
            .client()
            .request(method, params)
            .await
    }

    /// Runs `eth_estimateGas` for the request's sender, recipient, value and data.
    pub async fn estimate_gas(&self, request: &SimulationRequest) -> Result<u64, SimulationError> {
        let tx = transaction_request(request, None, None)?;
        let raw = self
            .call("eth_estimateGas", json!([tx]))
            .await
            .map_err(|err| match err {
                NodeError::Rpc { message, .. } => SimulationError::GasEstimationFailed(message),
                other => SimulationError::node("eth_estimateGas", other),
            })?;
        quantity::deserialize(&raw).map_err(|e| {
            SimulationError::DecodeError(format!("eth_estimateGas returned {raw}: {e}"))
        })
    }

    /// Executes the request as an unsigned transaction, which only works for senders the node
    /// controls. `gas` overrides the request's own gas limit.
    pub async fn send_transaction(
        &self,
        request: &SimulationRequest,
        gas: Option<u64>,
    ) -> Result<B256, SimulationError> {
        let tx = transaction_request(request, gas.or(request.gas), request.gas_price)?;
        let raw = self
            .call("eth_sendTransaction", json!([tx]))
            .await
            .map_err(|err| match err {
                NodeError::Rpc { message, .. } => SimulationError::ExecutionRejected(message),
                other => SimulationError::node("eth_sendTransaction", other),
            })?;
        B256::deserialize(&raw).map_err(|e| {
            SimulationError::DecodeError(format!("eth_sendTransaction returned {raw}: {e}"))
        })
    }

    /// Polls for the receipt of `tx_hash` until it shows up or the receipt timeout elapses.
    ///
    /// Failed polls are retried until the timeout, except when the node doesn't know the
    /// method at all. A receipt with a failed status is reported as a rejected execution.
    pub async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Receipt, SimulationError> {
        let started = Instant::now();
        loop {
            match self
                .call("eth_getTransactionReceipt", json!([tx_hash]))
                .await
            {
                Ok(Value::Null) => debug!(%tx_hash, "Receipt not available yet"),
                Ok(raw) => {
                    let receipt = Receipt::deserialize(&raw).map_err(|e| {
                        SimulationError::DecodeError(format!("Malformed receipt for {tx_hash}: {e}"))
                    })?;
                    if receipt.status == Some(0) {
                        return Err(SimulationError::ExecutionRejected(
                            "execution reverted".to_string(),
                        ));
                    }
                    return Ok(receipt);
                }
                Err(err) if err.is_method_missing() => {
                    return Err(SimulationError::node("eth_getTransactionReceipt", err))
                }
                Err(err) => debug!(%tx_hash, %err, "Receipt poll failed"),
            }

            let waited = started.elapsed();
            if waited >= self.receipt_timeout {
                return Err(SimulationError::ReceiptTimeout {
                    tx_hash: tx_hash.to_string(),
                    waited_ms: waited.as_millis(),
                });
            }
            sleep(
                self.receipt_poll_interval
                    .min(self.receipt_timeout - waited),
            )
            .await;
        }
    }

    /// Fetches the transaction object, which carries the value field receipts lack.
    pub async fn get_transaction(&self, tx_hash: B256) -> Result<TransactionInfo, SimulationError> {
        let raw = self
            .call("eth_getTransactionByHash", json!([tx_hash]))
            .await
            .map_err(|err| SimulationError::node("eth_getTransactionByHash", err))?;
        if raw.is_null() {
            return Err(SimulationError::NodeUnavailable(format!(
                "eth_getTransactionByHash returned nothing for {tx_hash}"
            )));
        }
        TransactionInfo::deserialize(&raw).map_err(|e| {
            SimulationError::DecodeError(format!("Malformed transaction {tx_hash}: {e}"))
        })
    }

    /// Fetches the trace the strategy asks for. `ReceiptOnly` needs no trace and returns `None`.
    pub async fn fetch_trace(
        &self,
        tx_hash: B256,
        strategy: TraceStrategy,
    ) -> Result<Option<TraceResponse>, SimulationError> {
        let (method, params) = match strategy {
            TraceStrategy::ReceiptOnly => return Ok(None),
            TraceStrategy::FlatTrace => (TRACE_METHOD, json!([tx_hash])),
            TraceStrategy::CallTree => {
                (DEBUG_TRACE_METHOD, json!([tx_hash, { "tracer": "callTracer" }]))
            }
        };

        let raw = self
            .call(method, params)
            .await
            .map_err(|err| match err {
                NodeError::Rpc { message, .. } => SimulationError::TracingUnsupported {
                    method: method.to_string(),
                    reason: message,
                },
                other => SimulationError::node(method, other),
            })?;
        debug!(method, %tx_hash, "Trace received");

        Ok(Some(match strategy {
            TraceStrategy::CallTree => TraceResponse::CallTree(raw),
            _ => TraceResponse::Flat(raw),
        }))
    }

    /// Read-only `eth_call` against the latest state. Transport failures are retried.
    pub async fn read_contract(&self, to: Address, calldata: Bytes) -> Result<Bytes, NodeError> {
        let params = json!([{ "to": to, "input": calldata }, "latest"]);
        let raw = retry_async(
            |_| self.call("eth_call", params.clone()),
            self.read_attempts,
            self.read_retry_delay,
            NodeError::is_transient,
        )
        .await?;
        Bytes::deserialize(&raw)
            .map_err(|e| NodeError::Decode(format!("eth_call returned {raw}: {e}")))
    }

    /// Lets the node execute unsigned transactions from `account` (anvil only).
    pub async fn impersonate(&self, account: Address) -> Result<(), SimulationError> {
        self.call("anvil_impersonateAccount", json!([account]))
            .await
            .map(|_| debug!(%account, "Impersonating sender"))
            .map_err(|err| impersonation_error("anvil_impersonateAccount", err))
    }

    pub async fn stop_impersonating(&self, account: Address) -> Result<(), SimulationError> {
        self.call("anvil_stopImpersonatingAccount", json!([account]))
            .await
            .map(|_| ())
            .map_err(|err| impersonation_error("anvil_stopImpersonatingAccount", err))
    }

    /// Returns the raw `Transfer` logs emitted in the block range, both ends inclusive.
    pub async fn get_transfer_logs(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Value>, SimulationError> {
        if from_block > to_block {
            return Err(SimulationError::InvalidInput(format!(
                "Empty block range {from_block}..={to_block}"
            )));
        }
        let filter = json!({
            "fromBlock": to_quantity(from_block),
            "toBlock": to_quantity(to_block),
            "topics": [TRANSFER_TOPIC],
        });
        let raw = self
            .call("eth_getLogs", json!([filter]))
            .await
            .map_err(|err| SimulationError::node("eth_getLogs", err))?;
        match raw {
            Value::Array(logs) => Ok(logs),
            other => {
                warn!(%other, "eth_getLogs returned a non-list value");
                Err(SimulationError::DecodeError(format!("eth_getLogs returned {other}")))
            }
        }
    }
}

fn impersonation_error(method: &str, err: NodeError) -> SimulationError {
    match err {
        err if err.is_method_missing() => SimulationError::UnsupportedMethod {
            method: method.to_string(),
            reason: err.to_string(),
        },
        NodeError::Rpc { message, .. } => SimulationError::ExecutionRejected(message),
        other => SimulationError::node(method, other),
    }
}

fn transaction_request(
    request: &SimulationRequest,
    gas: Option<u64>,
    gas_price: Option<u128>,
) -> Result<Value, SimulationError> {
    let tx = TransactionRequest {
        from: Some(request.from),
        to: request.to.map(TxKind::Call),
        value: (!request.value.is_zero()).then_some(request.value),
        input: if request.data.is_empty() {
            TransactionInput::default()
        } else {
            TransactionInput::new(request.data.clone())
        },
        gas,
        gas_price,
        ..Default::default()
    };
    serde_json::to_value(&tx)
        .map_err(|e| SimulationError::InvalidInput(format!("Unencodable transaction: {e}")))
}
