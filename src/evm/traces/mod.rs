//! Native transfer reconstruction from node traces.
//!
//! Nodes expose two incompatible trace shapes. Which one a response has is known from the method
//! that produced it, so the shape is carried as a variant of [`TraceResponse`] and each variant
//! has its own decoder. Decoders are pure and total: malformed input yields fewer records, never
//! an error.
use alloy_primitives::{Address, U256};
use serde_json::Value;

use crate::models::NativeTransfer;

pub mod call_tree;
pub mod flat;

/// A raw trace, tagged with the shape implied by the method that returned it.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceResponse {
    /// `trace_transaction`: a flat list of call records with trace addresses.
    Flat(Value),
    /// `debug_traceTransaction` with `callTracer`: a root frame with nested `calls`.
    CallTree(Value),
}

/// Which calls of a trace are turned into transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceScope {
    /// Every call, including the top-level one.
    #[default]
    All,
    /// Internal calls only. Used when the top-level transfer is already taken from the
    /// transaction itself.
    InternalOnly,
}

impl TraceResponse {
    pub fn native_transfers(&self, scope: TraceScope) -> Vec<NativeTransfer> {
        match self {
            TraceResponse::Flat(trace) => flat::decode(trace, scope),
            TraceResponse::CallTree(trace) => call_tree::decode(trace, scope),
        }
    }
}

/// Call types that run in the caller's context and never move native value, even though some
/// tracers report the parent's value on them.
fn moves_value(call_type: Option<&str>) -> bool {
    !matches!(
        call_type.map(str::to_ascii_lowercase).as_deref(),
        Some("delegatecall") | Some("staticcall")
    )
}

pub(crate) fn positive_transfer(
    from: Address,
    to: Option<Address>,
    value: Option<U256>,
) -> Option<NativeTransfer> {
    match (to, value) {
        (Some(to), Some(amount)) if amount > U256::ZERO => {
            Some(NativeTransfer { from, to, amount })
        }
        _ => None,
    }
}
