//! serde functions for the numeric encoding used on the JSON-RPC boundary.
//!
//! Nodes encode quantities as `0x`-prefixed hex strings without leading zeros. Some dev nodes
//! answer with plain JSON numbers instead, so deserialization accepts both.
use serde::{de, Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuantity {
    Number(u64),
    Text(String),
}

/// Parses a quantity from a hex string (`0x` prefix) or a decimal string.
pub fn parse_quantity(value: &str) -> Result<u128, String> {
    let value = value.trim();
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some("") => Ok(0),
        Some(digits) => u128::from_str_radix(digits, 16)
            .map_err(|e| format!("invalid hex quantity {value:?}: {e}")),
        None => value
            .parse::<u128>()
            .map_err(|e| format!("invalid quantity {value:?}: {e}")),
    }
}

/// Renders an integer as a JSON-RPC quantity.
pub fn to_quantity<T: Into<u128>>(value: T) -> String {
    format!("0x{:x}", value.into())
}

fn deserialize_raw<'de, D>(d: D) -> Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    match RawQuantity::deserialize(d)? {
        RawQuantity::Number(n) => Ok(n.into()),
        RawQuantity::Text(s) => parse_quantity(&s).map_err(de::Error::custom),
    }
}

/// serde functions for handling a `u64` as a hex quantity
pub mod quantity {
    use serde::{de, Deserializer, Serializer};

    /// Serialize a u64 as a hex string with 0x prefix
    pub fn serialize<S>(x: &u64, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&super::to_quantity(*x))
    }

    /// Deserialize a hex string or number into a u64
    pub fn deserialize<'de, D>(d: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = super::deserialize_raw(d)?;
        u64::try_from(value).map_err(|_| de::Error::custom(format!("quantity {value} exceeds u64")))
    }
}

/// serde functions for handling an `Option<u64>` as a hex quantity
pub mod quantity_option {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(x: &Option<u64>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match x {
            Some(x) => s.serialize_str(&super::to_quantity(*x)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<super::RawQuantity> = Option::deserialize(d)?;
        match value {
            None => Ok(None),
            Some(super::RawQuantity::Number(n)) => Ok(Some(n)),
            Some(super::RawQuantity::Text(s)) => {
                let value = super::parse_quantity(&s).map_err(de::Error::custom)?;
                u64::try_from(value)
                    .map(Some)
                    .map_err(|_| de::Error::custom(format!("quantity {value} exceeds u64")))
            }
        }
    }
}

/// serde functions for handling an `Option<u128>` as a hex quantity, such as gas prices
pub mod quantity_u128_option {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(x: &Option<u128>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match x {
            Some(x) => s.serialize_str(&super::to_quantity(*x)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Option<u128>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<super::RawQuantity> = Option::deserialize(d)?;
        match value {
            None => Ok(None),
            Some(super::RawQuantity::Number(n)) => Ok(Some(n.into())),
            Some(super::RawQuantity::Text(s)) => super::parse_quantity(&s)
                .map(Some)
                .map_err(de::Error::custom),
        }
    }
}
