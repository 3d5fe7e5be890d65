//! Decoder for the geth `callTracer` format.
use alloy_primitives::{Address, U256};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{moves_value, positive_transfer, TraceScope};
use crate::models::NativeTransfer;

/// The fields of a call frame that matter for transfers. Children are walked on the raw value.
#[derive(Debug, Deserialize)]
struct CallFrame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    from: Address,
    #[serde(default)]
    to: Option<Address>,
    #[serde(default)]
    value: Option<U256>,
}

/// Extracts native transfers from a call tree, in depth-first pre-order.
///
/// Frames without value still have their children visited. A frame that fails to decode is
/// skipped together with its subtree.
pub fn decode(trace: &Value, scope: TraceScope) -> Vec<NativeTransfer> {
    let mut transfers = Vec::new();
    // (frame, emit) pairs; children are pushed in reverse so they pop in call order.
    let mut stack = vec![(trace, scope == TraceScope::All)];

    while let Some((raw, emit)) = stack.pop() {
        let frame = match CallFrame::deserialize(raw) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(%err, "Skipping undecodable call frame");
                continue;
            }
        };

        if emit && moves_value(frame.kind.as_deref()) {
            if let Some(transfer) = positive_transfer(frame.from, frame.to, frame.value) {
                transfers.push(transfer);
            }
        }

        if let Some(children) = raw
            .get("calls")
            .and_then(Value::as_array)
        {
            stack.extend(
                children
                    .iter()
                    .rev()
                    .map(|child| (child, true)),
            );
        }
    }

    transfers
}
