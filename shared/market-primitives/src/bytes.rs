//! Strict fixed-width parsing helpers.
//!
//! Inputs that feed id derivation or signature recovery must have exactly the width the contract
//! expects. Nothing here pads or truncates.

use alloy_primitives::{Address, FixedBytes, U256};

use crate::ids::IdError;

/// Copy `bytes` into an `N`-byte array, failing unless the length matches exactly.
pub fn read_exact<const N: usize>(field: &'static str, bytes: &[u8]) -> Result<[u8; N], IdError> {
    if bytes.len() != N {
        return Err(IdError::BadWidth {
            field,
            expected: N,
            got: bytes.len(),
        });
    }
    let mut buf = [0u8; N];
    buf.copy_from_slice(bytes);
    Ok(buf)
}

pub fn read_address(field: &'static str, bytes: &[u8]) -> Result<Address, IdError> {
    read_exact::<20>(field, bytes).map(Address::from)
}

pub fn read_b32(field: &'static str, bytes: &[u8]) -> Result<FixedBytes<32>, IdError> {
    read_exact::<32>(field, bytes).map(FixedBytes)
}

pub fn read_u256_be(field: &'static str, bytes: &[u8]) -> Result<U256, IdError> {
    read_exact::<32>(field, bytes).map(U256::from_be_bytes)
}

/// Decode a `0x`-prefixed (or bare) hex string of exactly `N` bytes.
pub fn parse_hex_fixed<const N: usize>(field: &'static str, s: &str) -> Result<[u8; N], IdError> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    let raw = hex::decode(digits).map_err(|_| IdError::BadHex { field })?;
    read_exact::<N>(field, &raw)
}

/// Left-pad a 20-byte address into a 32-byte ABI word.
pub fn address_word(addr: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..32].copy_from_slice(addr.as_slice());
    word
}
