//! Decimal rendering methods for the U256 type
use alloy_primitives::U256;

use crate::errors::SimulationError;

/// Decimals of the chain's native currency.
pub const NATIVE_DECIMALS: u8 = 18;

/// Formats an integer amount of the smallest unit as a decimal string with `decimals` fractional
/// digits.
///
/// The conversion is exact: no floating point is involved, and trailing zeros of the
/// fractional part are trimmed (`1500000000000000000` with 18 decimals is `"1.5"`, `100` with
/// 2 decimals is `"1"`).
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };
    let (integer, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        integer.to_string()
    } else {
        format!("{integer}.{fraction}")
    }
}

/// Formats a native amount in whole-coin units.
pub fn format_ether(value: U256) -> String {
    format_units(value, NATIVE_DECIMALS)
}

/// Parses a decimal string such as `"1.5"` into an integer amount of the smallest unit.
///
/// # Errors
///
/// Returns `SimulationError::InvalidInput` if the string is not a plain decimal number, has
/// more fractional digits than `decimals`, or does not fit into 256 bits.
pub fn parse_units(value: &str, decimals: u8) -> Result<U256, SimulationError> {
    let value = value.trim();
    let invalid = || SimulationError::InvalidInput(format!("Invalid decimal amount: {value:?}"));

    let (integer, fraction) = value
        .split_once('.')
        .unwrap_or((value, ""));
    if integer.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !integer
        .chars()
        .chain(fraction.chars())
        .all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    if fraction.len() > decimals as usize {
        return Err(SimulationError::InvalidInput(format!(
            "Amount {value:?} has more than {decimals} fractional digits"
        )));
    }

    let digits = format!("{integer}{fraction:0<width$}", width = decimals as usize);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).map_err(|_| invalid())
}
