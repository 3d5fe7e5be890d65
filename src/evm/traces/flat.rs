//! Decoder for the Parity/Erigon `trace_transaction` format.
use alloy_primitives::{Address, U256};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{moves_value, positive_transfer, TraceScope};
use crate::models::NativeTransfer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlatTraceRecord {
    #[serde(rename = "type")]
    kind: String,
    action: CallAction,
    /// Position of the call in the call tree; empty, null or absent for the top-level call.
    #[serde(default)]
    trace_address: Option<Vec<u64>>,
}

impl FlatTraceRecord {
    fn is_internal(&self) -> bool {
        self.trace_address
            .as_ref()
            .is_some_and(|path| !path.is_empty())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallAction {
    from: Address,
    #[serde(default)]
    to: Option<Address>,
    #[serde(default)]
    value: Option<U256>,
    #[serde(default)]
    call_type: Option<String>,
}

/// Extracts native transfers from a flat call list, in list order.
///
/// Records that are not calls, carry no value, or fail to decode are skipped.
pub fn decode(trace: &Value, scope: TraceScope) -> Vec<NativeTransfer> {
    let Some(records) = trace.as_array() else {
        debug!("Flat trace is not a list, ignoring it");
        return Vec::new();
    };

    records
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| match FlatTraceRecord::deserialize(raw) {
            Ok(record) => Some(record),
            Err(err) => {
                debug!(index, %err, "Skipping undecodable trace record");
                None
            }
        })
        .filter(|record| record.kind.eq_ignore_ascii_case("call"))
        .filter(|record| moves_value(record.action.call_type.as_deref()))
        .filter(|record| scope == TraceScope::All || record.is_internal())
        .filter_map(|record| {
            positive_transfer(record.action.from, record.action.to, record.action.value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloy_primitives::address;
    use rstest::rstest;
    use serde_json::json;

    const SENDER: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    const BANK: Address = address!("d0db636309d53423b6bb7a3b318aaee7cc9cb41a");
    const VAULT: Address = address!("70997970c51812dc3a010c7d01b50e0d17dc79c8");

    fn call(from: Address, to: Address, value: &str, trace_address: Value) -> Value {
        json!({
            "action": {
                "callType": "call",
                "from": from,
                "gas": "0x1d4c8",
                "input": "0x",
                "to": to,
                "value": value,
            },
            "blockNumber": 12,
            "result": { "gasUsed": "0x0", "output": "0x" },
            "subtraces": 0,
            "traceAddress": trace_address,
            "transactionPosition": 0,
            "type": "call",
        })
    }

    #[test]
    fn test_emits_value_calls_in_order() {
        let trace = json!([
            call(SENDER, BANK, "0x14d1120d7b160000", json!([])),
            call(BANK, VAULT, "0x0", json!([0])),
            call(BANK, VAULT, "0xde0b6b3a7640000", json!([1])),
            call(VAULT, SENDER, "0x0", json!([1, 0])),
            call(VAULT, SENDER, "0x1", json!([1, 1])),
        ]);

        let transfers = decode(&trace, TraceScope::All);

        assert_eq!(
            transfers,
            vec![
                NativeTransfer {
                    from: SENDER,
                    to: BANK,
                    amount: U256::from(1_500_000_000_000_000_000u128)
                },
                NativeTransfer {
                    from: BANK,
                    to: VAULT,
                    amount: U256::from(1_000_000_000_000_000_000u128)
                },
                NativeTransfer { from: VAULT, to: SENDER, amount: U256::from(1u64) },
            ]
        );
    }

    #[test]
    fn test_internal_only_drops_top_level() {
        let trace = json!([
            call(SENDER, BANK, "0x10", json!([])),
            call(BANK, VAULT, "0x5", json!([0])),
        ]);

        let transfers = decode(&trace, TraceScope::InternalOnly);

        assert_eq!(transfers, vec![NativeTransfer { from: BANK, to: VAULT, amount: U256::from(5u64) }]);
    }

    #[rstest]
    #[case::null(Some(Value::Null))]
    #[case::absent(None)]
    fn test_missing_trace_address_is_top_level(#[case] trace_address: Option<Value>) {
        let mut top = call(SENDER, BANK, "0x10", json!([]));
        match trace_address {
            Some(value) => top["traceAddress"] = value,
            None => {
                top.as_object_mut()
                    .unwrap()
                    .remove("traceAddress");
            }
        }
        let trace = json!([top, call(BANK, VAULT, "0x5", json!([0]))]);

        assert_eq!(decode(&trace, TraceScope::All).len(), 2);
        assert_eq!(
            decode(&trace, TraceScope::InternalOnly),
            vec![NativeTransfer { from: BANK, to: VAULT, amount: U256::from(5u64) }]
        );
    }

    #[test]
    fn test_skips_non_value_records() {
        let mut delegate = call(BANK, VAULT, "0x10", json!([0]));
        delegate["action"]["callType"] = json!("delegatecall");
        let create = json!({
            "action": { "from": BANK, "value": "0x10", "init": "0x60", "gas": "0x1" },
            "traceAddress": [1],
            "type": "create",
        });
        let malformed = json!({ "type": "call", "action": { "from": "not an address" } });
        let trace = json!([delegate, create, malformed, 7, call(BANK, VAULT, "0x2", json!([2]))]);

        let transfers = decode(&trace, TraceScope::All);

        assert_eq!(transfers, vec![NativeTransfer { from: BANK, to: VAULT, amount: U256::from(2u64) }]);
    }

    #[test]
    fn test_non_list_input() {
        assert!(decode(&Value::Null, TraceScope::All).is_empty());
        assert!(decode(&json!({ "calls": [] }), TraceScope::All).is_empty());
        assert!(decode(&json!([]), TraceScope::InternalOnly).is_empty());
    }

    #[test]
    fn test_counts_only_positive_values() {
        let values = ["0x1", "0x0", "0x2", "0x0", "0x0", "0x3"];
        let trace = Value::Array(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| call(SENDER, BANK, v, json!([i])))
                .collect(),
        );

        let amounts: Vec<U256> = decode(&trace, TraceScope::All)
            .into_iter()
            .map(|t| t.amount)
            .collect();

        assert_eq!(amounts, vec![U256::from(1u64), U256::from(2u64), U256::from(3u64)]);
    }
}
