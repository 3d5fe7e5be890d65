//! Basic data structures
//!
//! This module contains the models shared across the crate: the request describing an unsent
//! transaction, the transfer records reconstructed from its execution and the result of a
//! successful simulation.
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::u256_num::format_ether;

/// Movement of the chain's native currency, either carried by the transaction's value field or
/// by an internal call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeTransfer {
    pub from: Address,
    pub to: Address,
    /// Amount in the smallest native unit (wei). Never zero.
    pub amount: U256,
}

impl NativeTransfer {
    /// Amount in whole-coin units.
    pub fn formatted_amount(&self) -> String {
        format_ether(self.amount)
    }
}

/// A fungible token movement, decoded from a 3-topic `Transfer` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FungibleTransfer {
    pub token_address: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
    /// `amount` scaled by `decimals`, or the raw integer string if decimals are unknown.
    pub formatted_amount: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
}

/// A non-fungible token movement, decoded from a 4-topic `Transfer` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonFungibleTransfer {
    pub token_address: Address,
    pub from: Address,
    pub to: Address,
    pub token_id: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransferRecord {
    Native(NativeTransfer),
    Fungible(FungibleTransfer),
    NonFungible(NonFungibleTransfer),
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransferKind {
    Native,
    Fungible,
    NonFungible,
}

impl TransferRecord {
    pub fn kind(&self) -> TransferKind {
        match self {
            TransferRecord::Native(_) => TransferKind::Native,
            TransferRecord::Fungible(_) => TransferKind::Fungible,
            TransferRecord::NonFungible(_) => TransferKind::NonFungible,
        }
    }

    pub fn sender(&self) -> Address {
        match self {
            TransferRecord::Native(t) => t.from,
            TransferRecord::Fungible(t) => t.from,
            TransferRecord::NonFungible(t) => t.from,
        }
    }

    pub fn recipient(&self) -> Address {
        match self {
            TransferRecord::Native(t) => t.to,
            TransferRecord::Fungible(t) => t.to,
            TransferRecord::NonFungible(t) => t.to,
        }
    }
}

impl From<NativeTransfer> for TransferRecord {
    fn from(value: NativeTransfer) -> Self {
        TransferRecord::Native(value)
    }
}

impl From<FungibleTransfer> for TransferRecord {
    fn from(value: FungibleTransfer) -> Self {
        TransferRecord::Fungible(value)
    }
}

impl From<NonFungibleTransfer> for TransferRecord {
    fn from(value: NonFungibleTransfer) -> Self {
        TransferRecord::NonFungible(value)
    }
}

/// Data needed to simulate an unsent transaction.
///
/// The sender must be controllable by the node (an unlocked dev account, or one the node is
/// told to impersonate), since no signature is produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationRequest {
    /// Address of the sending account
    pub from: Address,
    /// Address of the receiving account/contract. `None` means contract creation.
    pub to: Option<Address>,
    /// Amount of native currency sent
    pub value: U256,
    /// Calldata
    pub data: Bytes,
    /// Gas limit. Estimated by the node if absent.
    pub gas: Option<u64>,
    /// Legacy gas price. Chosen by the node if absent.
    pub gas_price: Option<u128>,
}

impl SimulationRequest {
    pub fn new(from: Address, to: Address) -> Self {
        Self { from, to: Some(to), ..Default::default() }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(gas);
        self
    }

    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }
}

/// Which node facility is used to reconstruct internal native transfers.
#[derive(Debug, Display, EnumString, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum TraceStrategy {
    /// Receipt and logs only: the top-level value transfer plus token events.
    #[default]
    #[strum(serialize = "receipt", serialize = "basic")]
    ReceiptOnly,
    /// `trace_transaction` (Parity/Erigon flat call list).
    #[strum(serialize = "flat", serialize = "trace")]
    FlatTrace,
    /// `debug_traceTransaction` with the geth `callTracer` (nested call tree).
    #[strum(serialize = "call_tree", serialize = "debug")]
    CallTree,
}

/// What to do when the requested tracer is not available on the node.
#[derive(Debug, Display, EnumString, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum TraceFallback {
    /// Fail the simulation with `TracingUnsupported`.
    #[default]
    #[strum(serialize = "fail")]
    Fail,
    /// Keep the receipt-derived records and drop internal transfers.
    #[strum(serialize = "receipt")]
    ReceiptOnly,
}

/// A result of a successful transaction simulation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    /// Hash the node assigned to the simulated execution. Meaningless after the revert.
    pub tx_hash: B256,
    /// Transfers in discovery order: top-level value, then token events in log order, then
    /// internal native transfers in trace order.
    pub transfers: Vec<TransferRecord>,
    /// Gas actually consumed by the execution
    pub gas_used: u64,
    /// Pre-flight estimate, when estimation ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_gas: Option<u64>,
    /// Strategy that produced the internal transfers. Differs from the requested one when the
    /// tracer was missing and the fallback applied.
    pub strategy: TraceStrategy,
}

impl SimulationResult {
    pub fn native_transfers(&self) -> impl Iterator<Item = &NativeTransfer> {
        self.transfers
            .iter()
            .filter_map(|t| match t {
                TransferRecord::Native(n) => Some(n),
                _ => None,
            })
    }

    pub fn fungible_transfers(&self) -> impl Iterator<Item = &FungibleTransfer> {
        self.transfers
            .iter()
            .filter_map(|t| match t {
                TransferRecord::Fungible(f) => Some(f),
                _ => None,
            })
    }

    pub fn non_fungible_transfers(&self) -> impl Iterator<Item = &NonFungibleTransfer> {
        self.transfers
            .iter()
            .filter_map(|t| match t {
                TransferRecord::NonFungible(n) => Some(n),
                _ => None,
            })
    }
}
