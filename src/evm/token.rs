//! ERC-20 metadata used to enrich fungible transfers.
//!
//! Metadata is best effort: any failure leaves the corresponding field unknown and never fails
//! the simulation.
use alloy_primitives::{Address, Bytes};
use alloy_sol_types::{sol, SolCall};
use mini_moka::sync::Cache;
use tracing::{debug, warn};

use crate::{
    config::SimulatorConfig,
    evm::{gateway::RpcGateway, node::NodeClient},
};

sol! {
    function symbol() external view returns (string);
    function decimals() external view returns (uint8);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

impl TokenMetadata {
    fn is_complete(&self) -> bool {
        self.symbol.is_some() && self.decimals.is_some()
    }
}

/// Reads token metadata through the gateway and caches complete answers per token.
pub struct TokenMetadataReader {
    cache: Cache<Address, TokenMetadata>,
}

impl TokenMetadataReader {
    pub fn new(config: &SimulatorConfig) -> Self {
        Self { cache: Cache::new(config.metadata_cache_size) }
    }

    pub async fn metadata<N: NodeClient>(
        &self,
        gateway: &RpcGateway<N>,
        token: Address,
    ) -> TokenMetadata {
        if let Some(cached) = self.cache.get(&token) {
            return cached;
        }

        let (symbol, decimals) = tokio::join!(
            read(gateway, token, symbolCall {}.abi_encode(), decode_symbol),
            read(gateway, token, decimalsCall {}.abi_encode(), decode_decimals),
        );
        let metadata = TokenMetadata { symbol, decimals };
        debug!(%token, ?metadata, "Token metadata read");

        // Partial answers are not cached, a later read may still succeed.
        if metadata.is_complete() {
            self.cache
                .insert(token, metadata.clone());
        }
        metadata
    }
}

async fn read<N, T, D>(
    gateway: &RpcGateway<N>,
    token: Address,
    calldata: Vec<u8>,
    decode: D,
) -> Option<T>
where
    N: NodeClient,
    D: Fn(&[u8]) -> Option<T>,
{
    match gateway
        .read_contract(token, Bytes::from(calldata))
        .await
    {
        Ok(output) => {
            let decoded = decode(&output);
            if decoded.is_none() {
                debug!(%token, %output, "Undecodable metadata output");
            }
            decoded
        }
        Err(err) => {
            warn!(%token, %err, "Token metadata read failed");
            None
        }
    }
}

/// Decodes a `string` symbol, or a `bytes32` one as returned by some older tokens.
fn decode_symbol(output: &[u8]) -> Option<String> {
    if let Ok(decoded) = symbolCall::abi_decode_returns(output, true) {
        return Some(decoded._0);
    }
    if output.len() != 32 {
        return None;
    }
    let end = output
        .iter()
        .position(|b| *b == 0)
        .unwrap_or(output.len());
    String::from_utf8(output[..end].to_vec())
        .ok()
        .filter(|symbol| !symbol.is_empty())
}

fn decode_decimals(output: &[u8]) -> Option<u8> {
    decimalsCall::abi_decode_returns(output, true)
        .ok()
        .map(|decoded| decoded._0)
}
