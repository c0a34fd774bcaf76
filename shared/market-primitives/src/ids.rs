//! Conditional-token identifier derivation.
//!
//! These ids double as ERC-1155 token ids on the conditional-token contract, so the packing below
//! must match `abi.encodePacked` on-chain byte for byte:
//!
//! - `conditionId  = keccak256(oracle[20] || questionId[32] || outcomeSlotCount[32])`
//! - `collectionId = keccak256(parentCollectionId[32] || conditionId[32] || indexSet[32])`
//! - `positionId   = uint256(keccak256(collateralToken[20] || collectionId[32]))`

use alloy_primitives::{keccak256, Address, B256, U256};

use crate::bytes::{read_address, read_b32, read_u256_be};

/// Errors while turning untyped input into id-derivation arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("{field}: expected {expected} bytes, got {got}")]
    BadWidth {
        field: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{field}: not valid hex")]
    BadHex { field: &'static str },
    #[error("index set {index_set} is not a proper subset of {outcome_slot_count} outcome slots")]
    BadIndexSet {
        index_set: U256,
        outcome_slot_count: U256,
    },
    #[error("outcome index {0} is not a binary outcome")]
    BadOutcome(u64),
}

/// Outcome slots of a binary (YES/NO) condition.
pub const BINARY_OUTCOME_SLOTS: u64 = 2;

/// Outcome bitmasks for binary (YES/NO) markets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexSet {
    Yes = 1,
    No = 2,
    Full = 3,
}

impl IndexSet {
    pub fn as_u256(self) -> U256 {
        U256::from(self as u8)
    }

    /// Outcome 0 is YES, outcome 1 is NO.
    pub fn for_outcome(outcome_index: u64) -> Result<Self, IdError> {
        match outcome_index {
            0 => Ok(IndexSet::Yes),
            1 => Ok(IndexSet::No),
            other => Err(IdError::BadOutcome(other)),
        }
    }
}

pub fn condition_id(oracle: Address, question_id: B256, outcome_slot_count: U256) -> B256 {
    let mut buf = Vec::with_capacity(20 + 32 + 32);
    buf.extend_from_slice(oracle.as_slice());
    buf.extend_from_slice(question_id.as_slice());
    buf.extend_from_slice(&outcome_slot_count.to_be_bytes::<32>());
    keccak256(buf)
}

pub fn collection_id(parent_collection_id: B256, condition_id: B256, index_set: U256) -> B256 {
    let mut buf = Vec::with_capacity(32 * 3);
    buf.extend_from_slice(parent_collection_id.as_slice());
    buf.extend_from_slice(condition_id.as_slice());
    buf.extend_from_slice(&index_set.to_be_bytes::<32>());
    keccak256(buf)
}

pub fn position_id(collateral_token: Address, collection_id: B256) -> U256 {
    let mut buf = Vec::with_capacity(20 + 32);
    buf.extend_from_slice(collateral_token.as_slice());
    buf.extend_from_slice(collection_id.as_slice());
    U256::from_be_bytes(keccak256(buf).0)
}

/// Position id of one outcome of a top-level (no parent collection) binary condition.
pub fn binary_position_id(collateral_token: Address, condition: B256, outcome: IndexSet) -> U256 {
    let collection = collection_id(B256::ZERO, condition, outcome.as_u256());
    position_id(collateral_token, collection)
}

/// Reject the empty set and anything outside the condition's outcome slots.
pub fn validate_index_set(index_set: U256, outcome_slot_count: U256) -> Result<(), IdError> {
    let bad = || IdError::BadIndexSet {
        index_set,
        outcome_slot_count,
    };
    if index_set.is_zero() || outcome_slot_count < U256::from(2u8) || outcome_slot_count > U256::from(255u8) {
        return Err(bad());
    }
    let full = (U256::from(1u8) << outcome_slot_count.to::<usize>()) - U256::from(1u8);
    if index_set > full {
        return Err(bad());
    }
    Ok(())
}

pub fn condition_id_from_slices(
    oracle: &[u8],
    question_id: &[u8],
    outcome_slot_count: &[u8],
) -> Result<B256, IdError> {
    Ok(condition_id(
        read_address("oracle", oracle)?,
        read_b32("questionId", question_id)?,
        read_u256_be("outcomeSlotCount", outcome_slot_count)?,
    ))
}

pub fn collection_id_from_slices(
    parent_collection_id: &[u8],
    condition_id: &[u8],
    index_set: &[u8],
) -> Result<B256, IdError> {
    Ok(collection_id(
        read_b32("parentCollectionId", parent_collection_id)?,
        read_b32("conditionId", condition_id)?,
        read_u256_be("indexSet", index_set)?,
    ))
}

pub fn position_id_from_slices(collateral_token: &[u8], collection_id: &[u8]) -> Result<U256, IdError> {
    Ok(position_id(
        read_address("collateralToken", collateral_token)?,
        read_b32("collectionId", collection_id)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    const ORACLE: Address = address!("00000000000000000000000000000000000000aa");
    const QUESTION: B256 = b256!("1111111111111111111111111111111111111111111111111111111111111111");

    #[test]
    fn condition_id_is_keccak_of_packed_fields() {
        let mut packed = Vec::new();
        packed.extend_from_slice(ORACLE.as_slice());
        packed.extend_from_slice(QUESTION.as_slice());
        let mut slots = [0u8; 32];
        slots[31] = 2;
        packed.extend_from_slice(&slots);
        assert_eq!(packed.len(), 84);
        assert_eq!(condition_id(ORACLE, QUESTION, U256::from(2u8)), keccak256(&packed));
    }

    #[test]
    fn condition_id_is_deterministic_and_input_sensitive() {
        let base = condition_id(ORACLE, QUESTION, U256::from(2u8));
        assert_eq!(base, condition_id(ORACLE, QUESTION, U256::from(2u8)));

        let other_oracle = address!("00000000000000000000000000000000000000ab");
        let mut other_question = QUESTION;
        other_question.0[31] ^= 1;
        assert_ne!(base, condition_id(other_oracle, QUESTION, U256::from(2u8)));
        assert_ne!(base, condition_id(ORACLE, other_question, U256::from(2u8)));
        assert_ne!(base, condition_id(ORACLE, QUESTION, U256::from(3u8)));
    }

    #[test]
    fn yes_and_no_positions_differ() {
        let collateral = address!("79a02482a880bce3f13e09da970dc34db4cd24d1");
        let condition = condition_id(ORACLE, QUESTION, U256::from(2u8));
        let yes = binary_position_id(collateral, condition, IndexSet::Yes);
        let no = binary_position_id(collateral, condition, IndexSet::No);
        assert_ne!(yes, no);
        assert_eq!(
            yes,
            position_id(collateral, collection_id(B256::ZERO, condition, U256::from(1u8)))
        );
    }

    #[test]
    fn slice_front_ends_reject_bad_widths() {
        let err = condition_id_from_slices(&[0u8; 19], &[0u8; 32], &[0u8; 32]).unwrap_err();
        assert_eq!(err, IdError::BadWidth { field: "oracle", expected: 20, got: 19 });

        let err = collection_id_from_slices(&[0u8; 32], &[0u8; 32], &[1u8; 1]).unwrap_err();
        assert_eq!(err, IdError::BadWidth { field: "indexSet", expected: 32, got: 1 });

        let err = position_id_from_slices(&[0u8; 20], &[0u8; 33]).unwrap_err();
        assert_eq!(err, IdError::BadWidth { field: "collectionId", expected: 32, got: 33 });

        let typed = condition_id(ORACLE, QUESTION, U256::from(2u8));
        let from_slices = condition_id_from_slices(
            ORACLE.as_slice(),
            QUESTION.as_slice(),
            &U256::from(2u8).to_be_bytes::<32>(),
        )
        .unwrap();
        assert_eq!(typed, from_slices);
    }

    #[test]
    fn index_sets() {
        assert_eq!(IndexSet::Yes.as_u256(), U256::from(1u8));
        assert_eq!(IndexSet::No.as_u256(), U256::from(2u8));
        assert_eq!(IndexSet::Full.as_u256(), U256::from(3u8));
        assert_eq!(IndexSet::for_outcome(1), Ok(IndexSet::No));
        assert_eq!(IndexSet::for_outcome(2), Err(IdError::BadOutcome(2)));

        let two = U256::from(2u8);
        assert!(validate_index_set(U256::from(3u8), two).is_ok());
        assert!(validate_index_set(U256::ZERO, two).is_err());
        assert!(validate_index_set(U256::from(4u8), two).is_err());
    }
}
