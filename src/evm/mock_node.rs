//! In-memory node used by the tests.
//!
//! Models just enough of an Anvil-like dev node: a numeric chain state that every executed
//! transaction bumps, a snapshot stack, receipts and transactions for executed calls, and
//! scripted answers for everything else.
use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use alloy_primitives::{Address, B256};
use serde_json::{json, Value};

use crate::{errors::NodeError, evm::node::NodeClient};

#[derive(Debug, Default)]
struct MockState {
    chain_state: u64,
    next_snapshot_id: u64,
    snapshots: Vec<(u64, u64)>,
    tx_count: u64,
    transactions: HashMap<String, Value>,
    receipts: HashMap<String, Value>,
    receipt_logs: Vec<Value>,
    gas_used: u64,
    pending_polls: usize,
    one_shot: HashMap<String, VecDeque<Result<Value, NodeError>>>,
    fixed: HashMap<String, Result<Value, NodeError>>,
    contract_calls: HashMap<(Address, String), Result<Value, NodeError>>,
    calls: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct MockNode {
    state: Mutex<MockState>,
}

pub(crate) fn method_not_found(method: &str) -> NodeError {
    NodeError::Rpc { code: -32601, message: format!("Method {method} not found") }
}

pub(crate) fn execution_reverted() -> NodeError {
    NodeError::Rpc { code: 3, message: "execution reverted".to_string() }
}

impl MockNode {
    pub(crate) fn new() -> Self {
        Self { state: Mutex::new(MockState { gas_used: 21_000, ..Default::default() }) }
    }

    /// Logs attached to the receipt of every executed transaction.
    pub(crate) fn with_logs(self, logs: Vec<Value>) -> Self {
        self.lock().receipt_logs = logs;
        self
    }

    pub(crate) fn with_gas_used(self, gas_used: u64) -> Self {
        self.lock().gas_used = gas_used;
        self
    }

    /// Number of receipt polls answered with `null` before the receipt shows up.
    pub(crate) fn with_pending_polls(self, polls: usize) -> Self {
        self.lock().pending_polls = polls;
        self
    }

    /// Answers every `method` request with `response`.
    pub(crate) fn with_response(self, method: &str, response: Result<Value, NodeError>) -> Self {
        self.lock()
            .fixed
            .insert(method.to_string(), response);
        self
    }

    /// Answers the `eth_call` to `to` whose calldata starts with `selector` (hex, no prefix).
    pub(crate) fn with_contract_call(
        self,
        to: Address,
        selector: &str,
        response: Result<Value, NodeError>,
    ) -> Self {
        self.lock()
            .contract_calls
            .insert((to, selector.to_lowercase()), response);
        self
    }

    /// Answers the next `method` request with `response`, ahead of any other behaviour.
    pub(crate) fn push_response(&self, method: &str, response: Result<Value, NodeError>) {
        self.lock()
            .one_shot
            .entry(method.to_string())
            .or_default()
            .push_back(response);
    }

    /// Observable chain state; changes with every executed transaction.
    pub(crate) fn chain_state(&self) -> u64 {
        self.lock().chain_state
    }

    pub(crate) fn snapshot_depth(&self) -> usize {
        self.lock().snapshots.len()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(crate) fn count(&self, method: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|m| m.as_str() == method)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn dispatch(state: &mut MockState, method: &str, params: &Value) -> Result<Value, NodeError> {
        if let Some(response) = state
            .one_shot
            .get_mut(method)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }
        if let Some(response) = state.fixed.get(method) {
            return response.clone();
        }

        match method {
            "evm_snapshot" => {
                state.next_snapshot_id += 1;
                let id = state.next_snapshot_id;
                state
                    .snapshots
                    .push((id, state.chain_state));
                Ok(json!(format!("0x{id:x}")))
            }
            "evm_revert" => {
                let requested = params[0]
                    .as_str()
                    .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok());
                let position = requested.and_then(|id| {
                    state
                        .snapshots
                        .iter()
                        .position(|(sid, _)| *sid == id)
                });
                match position {
                    Some(position) => {
                        state.chain_state = state.snapshots[position].1;
                        state.snapshots.truncate(position);
                        Ok(json!(true))
                    }
                    None => Ok(json!(false)),
                }
            }
            "eth_estimateGas" => Ok(json!("0x5208")),
            "eth_sendTransaction" => {
                let tx = &params[0];
                let input = tx
                    .get("input")
                    .or_else(|| tx.get("data"))
                    .cloned()
                    .unwrap_or(json!("0x"));
                state.tx_count += 1;
                state.chain_state += 1;
                let hash = B256::left_padding_from(&state.tx_count.to_be_bytes()).to_string();
                state.transactions.insert(
                    hash.clone(),
                    json!({
                        "hash": hash,
                        "from": tx["from"],
                        "to": tx["to"],
                        "value": tx.get("value").cloned().unwrap_or(json!("0x0")),
                        "gasPrice": tx.get("gasPrice").cloned().unwrap_or(json!("0x1")),
                        "input": input,
                    }),
                );
                state.receipts.insert(
                    hash.clone(),
                    json!({
                        "transactionHash": hash,
                        "status": "0x1",
                        "gasUsed": format!("0x{:x}", state.gas_used),
                        "logs": state.receipt_logs,
                    }),
                );
                Ok(json!(hash))
            }
            "eth_getTransactionReceipt" => {
                if state.pending_polls > 0 {
                    state.pending_polls -= 1;
                    return Ok(Value::Null);
                }
                let hash = params[0].as_str().unwrap_or_default();
                Ok(state
                    .receipts
                    .get(hash)
                    .cloned()
                    .unwrap_or(Value::Null))
            }
            "eth_getTransactionByHash" => {
                let hash = params[0].as_str().unwrap_or_default();
                Ok(state
                    .transactions
                    .get(hash)
                    .cloned()
                    .unwrap_or(Value::Null))
            }
            "eth_call" => {
                let to = params[0]["to"]
                    .as_str()
                    .and_then(|s| s.parse::<Address>().ok())
                    .unwrap_or_default();
                let data = params[0]["input"]
                    .as_str()
                    .or_else(|| params[0]["data"].as_str())
                    .unwrap_or_default()
                    .trim_start_matches("0x")
                    .to_lowercase();
                state
                    .contract_calls
                    .iter()
                    .find(|((address, selector), _)| *address == to && data.starts_with(selector))
                    .map(|(_, response)| response.clone())
                    .unwrap_or_else(|| Err(execution_reverted()))
            }
            "anvil_impersonateAccount" | "anvil_stopImpersonatingAccount" => Ok(Value::Null),
            other => Err(method_not_found(other)),
        }
    }
}

impl NodeClient for MockNode {
    async fn request(&self, method: &str, params: Value) -> Result<Value, NodeError> {
        let mut state = self.lock();
        state.calls.push(method.to_string());
        Self::dispatch(&mut state, method, &params)
    }
}
