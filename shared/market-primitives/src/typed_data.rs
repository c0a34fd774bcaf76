//! EIP-712 domain separation and struct hashing.
//!
//! Each intent type pins an ordered [`Schema`]. The type string is derived from that field list,
//! so the typehash and the encoded words always come from the same ordering.

use alloy_primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::bytes::address_word;

pub const DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Typed-data domain the entrypoint contract verifies against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl Domain {
    pub fn new(name: impl Into<String>, version: impl Into<String>, chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            chain_id,
            verifying_contract,
        }
    }

    pub fn separator(&self) -> B256 {
        let mut buf = Vec::with_capacity(32 * 5);
        buf.extend_from_slice(keccak256(DOMAIN_TYPE).as_slice());
        buf.extend_from_slice(keccak256(self.name.as_bytes()).as_slice());
        buf.extend_from_slice(keccak256(self.version.as_bytes()).as_slice());
        buf.extend_from_slice(&U256::from(self.chain_id).to_be_bytes::<32>());
        buf.extend_from_slice(&address_word(self.verifying_contract));
        keccak256(buf)
    }

    /// Final digest: `keccak256("\x19\x01" || domainSeparator || structHash)`.
    pub fn signing_digest(&self, struct_hash: B256) -> B256 {
        let mut buf = Vec::with_capacity(2 + 32 + 32);
        buf.extend_from_slice(b"\x19\x01");
        buf.extend_from_slice(self.separator().as_slice());
        buf.extend_from_slice(struct_hash.as_slice());
        keccak256(buf)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub ty: &'static str,
    pub name: &'static str,
}

impl Field {
    pub const fn new(ty: &'static str, name: &'static str) -> Self {
        Self { ty, name }
    }
}

/// Pinned primary type with its fields in signing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Schema {
    pub primary_type: &'static str,
    pub fields: &'static [Field],
}

impl Schema {
    /// `Name(type0 name0,type1 name1,...)`
    pub fn type_string(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("{} {}", f.ty, f.name))
            .collect();
        format!("{}({})", self.primary_type, fields.join(","))
    }

    pub fn type_hash(&self) -> B256 {
        keccak256(self.type_string().as_bytes())
    }

    /// `keccak256(typeHash || enc(field0) || ... )`. `words` must follow `fields` exactly.
    pub fn hash_struct(&self, words: &[B256]) -> B256 {
        debug_assert_eq!(words.len(), self.fields.len(), "{} word count", self.primary_type);
        let mut buf = Vec::with_capacity(32 * (1 + words.len()));
        buf.extend_from_slice(self.type_hash().as_slice());
        for word in words {
            buf.extend_from_slice(word.as_slice());
        }
        keccak256(buf)
    }
}

pub fn word_address(addr: Address) -> B256 {
    B256::from(address_word(addr))
}

pub fn word_u256(value: U256) -> B256 {
    B256::from(value.to_be_bytes::<32>())
}

pub fn word_bool(value: bool) -> B256 {
    word_u256(U256::from(value as u8))
}

/// Dynamic `string`/`bytes` members are encoded as the hash of their contents.
pub fn word_string(value: &str) -> B256 {
    keccak256(value.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const MAIL: Schema = Schema {
        primary_type: "Mail",
        fields: &[Field::new("address", "to"), Field::new("string", "contents")],
    };

    #[test]
    fn type_string_follows_field_order() {
        assert_eq!(MAIL.type_string(), "Mail(address to,string contents)");
        assert_eq!(MAIL.type_hash(), keccak256(b"Mail(address to,string contents)"));
    }

    #[test]
    fn separator_binds_every_domain_field() {
        let base = Domain::new("PredictionMarketRelay", "1", 480, address!("00000000000000000000000000000000000000e1"));
        let mut other_chain = base.clone();
        other_chain.chain_id = 4801;
        let mut other_contract = base.clone();
        other_contract.verifying_contract = address!("00000000000000000000000000000000000000e2");
        let mut other_version = base.clone();
        other_version.version = "2".into();

        assert_ne!(base.separator(), other_chain.separator());
        assert_ne!(base.separator(), other_contract.separator());
        assert_ne!(base.separator(), other_version.separator());
    }

    #[test]
    fn word_encodings() {
        assert_eq!(word_bool(true), B256::with_last_byte(1));
        assert_eq!(word_bool(false), B256::ZERO);
        assert_eq!(word_u256(U256::from(5u8)), B256::with_last_byte(5));
        assert_eq!(word_string("hello"), keccak256("hello"));
    }
}
