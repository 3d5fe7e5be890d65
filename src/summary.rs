//! Human-readable transfer summary
//!
//! Presentation only: the output format is not stable and should not be parsed.
use std::fmt;

use alloy_primitives::U256;
use itertools::Itertools;

use crate::{
    models::{SimulationResult, TransferKind, TransferRecord},
    u256_num::format_ether,
};

const NATIVE_SYMBOL: &str = "ETH";

/// Formats transfers grouped by kind, with a count per group and one line per transfer.
///
/// ```text
/// Native transfers (1), total 1.5 ETH
///   0xf39F…2266 -> 0x7099…79C8: 1.5 ETH
/// Fungible token transfers (1)
///   0xf39F…2266 -> 0x7099…79C8: 100 USDC
/// ```
pub struct TransferSummary<'a> {
    transfers: &'a [TransferRecord],
    native_symbol: &'a str,
}

impl<'a> TransferSummary<'a> {
    pub fn new(transfers: &'a [TransferRecord]) -> Self {
        Self { transfers, native_symbol: NATIVE_SYMBOL }
    }

    /// Symbol printed after native amounts, for chains whose currency isn't ether.
    pub fn with_native_symbol(mut self, symbol: &'a str) -> Self {
        self.native_symbol = symbol;
        self
    }

    fn write_transfer(&self, f: &mut fmt::Formatter<'_>, transfer: &TransferRecord) -> fmt::Result {
        match transfer {
            TransferRecord::Native(t) => {
                writeln!(f, "  {} -> {}: {} {}", t.from, t.to, t.formatted_amount(), self.native_symbol)
            }
            TransferRecord::Fungible(t) => {
                let unit = t
                    .symbol
                    .clone()
                    .unwrap_or_else(|| format!("of {}", t.token_address));
                writeln!(f, "  {} -> {}: {} {}", t.from, t.to, t.formatted_amount, unit)
            }
            TransferRecord::NonFungible(t) => {
                writeln!(f, "  {} -> {}: token #{} of {}", t.from, t.to, t.token_id, t.token_address)
            }
        }
    }
}

fn label(kind: TransferKind) -> &'static str {
    match kind {
        TransferKind::Native => "Native transfers",
        TransferKind::Fungible => "Fungible token transfers",
        TransferKind::NonFungible => "Non-fungible token transfers",
    }
}

impl fmt::Display for TransferSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.transfers.is_empty() {
            return writeln!(f, "No transfers");
        }

        let groups = self
            .transfers
            .iter()
            .into_group_map_by(|transfer| transfer.kind());
        for (kind, transfers) in groups
            .into_iter()
            .sorted_by_key(|(kind, _)| *kind)
        {
            write!(f, "{} ({})", label(kind), transfers.len())?;
            if kind == TransferKind::Native {
                let total = transfers
                    .iter()
                    .filter_map(|transfer| match transfer {
                        TransferRecord::Native(t) => Some(t.amount),
                        _ => None,
                    })
                    .fold(U256::ZERO, |acc, amount| acc.saturating_add(amount));
                write!(f, ", total {} {}", format_ether(total), self.native_symbol)?;
            }
            writeln!(f)?;
            for transfer in transfers {
                self.write_transfer(f, transfer)?;
            }
        }
        Ok(())
    }
}

impl SimulationResult {
    pub fn summary(&self) -> TransferSummary<'_> {
        TransferSummary::new(&self.transfers)
    }
}
