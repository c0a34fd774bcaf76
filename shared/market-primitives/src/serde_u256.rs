//! `#[serde(with = "...")]` helpers for 256-bit amounts on the JSON surface.
//!
//! Amounts are written as decimal strings. On input we also take `0x` hex strings and plain JSON
//! integers, since wallets disagree on which one to send.

use alloy_primitives::U256;
use serde::{de, Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Raw {
    Str(String),
    Num(u64),
}

pub fn parse(s: &str) -> Result<U256, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(s, 10),
    };
    parsed.map_err(|e| format!("invalid uint256 {s:?}: {e}"))
}

pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    match Raw::deserialize(deserializer)? {
        Raw::Str(s) => parse(&s).map_err(de::Error::custom),
        Raw::Num(n) => Ok(U256::from(n)),
    }
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<U256>, D::Error> {
        match Option::<Raw>::deserialize(deserializer)? {
            Some(Raw::Str(s)) => parse(&s).map(Some).map_err(de::Error::custom),
            Some(Raw::Num(n)) => Ok(Some(U256::from(n))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Amount {
        #[serde(with = "crate::serde_u256")]
        value: U256,
    }

    #[test]
    fn accepts_decimal_hex_and_numbers() {
        let dec: Amount = serde_json::from_str(r#"{"value":"1000"}"#).unwrap();
        let hex: Amount = serde_json::from_str(r#"{"value":"0x3e8"}"#).unwrap();
        let num: Amount = serde_json::from_str(r#"{"value":1000}"#).unwrap();
        assert_eq!(dec.value, U256::from(1000u64));
        assert_eq!(dec, hex);
        assert_eq!(dec, num);
        assert!(serde_json::from_str::<Amount>(r#"{"value":"12abc"}"#).is_err());
    }

    #[test]
    fn writes_decimal_strings() {
        let json = serde_json::to_string(&Amount { value: U256::from(42u8) }).unwrap();
        assert_eq!(json, r#"{"value":"42"}"#);
    }
}
