//! Token transfer reconstruction from receipt logs.
//!
//! ERC-20 and ERC-721 share the `Transfer(address,address,uint256)` signature and differ only in
//! whether the last argument is indexed, so the number of topics decides the standard.
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolEvent};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    evm::{gateway::RpcGateway, node::NodeClient, token::TokenMetadataReader},
    models::{FungibleTransfer, NonFungibleTransfer, TransferRecord},
    u256_num::format_units,
};

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
}

/// `keccak256("Transfer(address,address,uint256)")`
pub const TRANSFER_TOPIC: B256 = Transfer::SIGNATURE_HASH;

#[derive(Debug, Deserialize)]
struct RawLog {
    address: Address,
    #[serde(default)]
    topics: Vec<B256>,
    #[serde(default)]
    data: Bytes,
}

/// A token transfer read from a single log, before metadata enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    Fungible { token: Address, from: Address, to: Address, amount: U256 },
    NonFungible(NonFungibleTransfer),
}

/// Classifies one log.
///
/// Returns `Ok(None)` for logs that are not token transfers, including `Transfer` logs with a
/// topic count other than 3 or 4, and `Err` for logs that claim to be a fungible transfer but
/// cannot be decoded.
pub fn classify(log: &Value) -> Result<Option<TokenEvent>, String> {
    let log = RawLog::deserialize(log).map_err(|e| e.to_string())?;
    if log.topics.first() != Some(&TRANSFER_TOPIC) {
        return Ok(None);
    }

    match log.topics.as_slice() {
        [_, from, to, token_id] => Ok(Some(TokenEvent::NonFungible(NonFungibleTransfer {
            token_address: log.address,
            from: Address::from_word(*from),
            to: Address::from_word(*to),
            token_id: U256::from_be_bytes(token_id.0),
        }))),
        [_, from, to] => {
            if log.data.is_empty() || log.data.len() > 32 {
                return Err(format!("{} bytes of data for a fungible amount", log.data.len()));
            }
            Ok(Some(TokenEvent::Fungible {
                token: log.address,
                from: Address::from_word(*from),
                to: Address::from_word(*to),
                amount: U256::from_be_slice(&log.data),
            }))
        }
        topics => {
            trace!(token = %log.address, topics = topics.len(), "Ignoring non-standard Transfer");
            Ok(None)
        }
    }
}

/// Turns receipt logs into token transfer records, enriching fungible ones with metadata.
pub struct LogAnalyzer<'a, N> {
    gateway: &'a RpcGateway<N>,
    tokens: &'a TokenMetadataReader,
}

impl<'a, N: NodeClient> LogAnalyzer<'a, N> {
    pub fn new(gateway: &'a RpcGateway<N>, tokens: &'a TokenMetadataReader) -> Self {
        Self { gateway, tokens }
    }

    /// Returns the token transfers of `logs` in log order. Undecodable logs are skipped.
    pub async fn analyze(&self, logs: &[Value]) -> Vec<TransferRecord> {
        let mut transfers = Vec::new();
        for (index, log) in logs.iter().enumerate() {
            match classify(log) {
                Ok(Some(TokenEvent::NonFungible(transfer))) => transfers.push(transfer.into()),
                Ok(Some(TokenEvent::Fungible { token, from, to, amount })) => {
                    let metadata = self
                        .tokens
                        .metadata(self.gateway, token)
                        .await;
                    let formatted_amount = match metadata.decimals {
                        Some(decimals) => format_units(amount, decimals),
                        None => amount.to_string(),
                    };
                    transfers.push(
                        FungibleTransfer {
                            token_address: token,
                            from,
                            to,
                            amount,
                            formatted_amount,
                            symbol: metadata.symbol,
                            decimals: metadata.decimals,
                        }
                        .into(),
                    );
                }
                Ok(None) => {}
                Err(reason) => debug!(index, %reason, "Skipping undecodable log"),
            }
        }
        transfers
    }
}
