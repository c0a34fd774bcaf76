//! Signed-intent payloads and their pinned EIP-712 schemas.
//!
//! The schemas are part of the entrypoint's ABI. Changing a field name, type or position yields an
//! unrelated typehash, so any change here must ship together with a new domain version.

use std::{fmt, str::FromStr};

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::typed_data::{word_address, word_bool, word_string, word_u256, Domain, Field, Schema};

/// Typed-data domain name the entrypoint was deployed with.
pub const DOMAIN_NAME: &str = "PredictionMarketRelay";
/// Bumped whenever an intent schema changes.
pub const DOMAIN_VERSION: &str = "1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    CreateProposal,
    CastVote,
    ExecuteZap,
}

impl IntentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IntentKind::CreateProposal => "create_proposal",
            IntentKind::CastVote => "cast_vote",
            IntentKind::ExecuteZap => "execute_zap",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_proposal" => Ok(IntentKind::CreateProposal),
            "cast_vote" => Ok(IntentKind::CastVote),
            "execute_zap" => Ok(IntentKind::ExecuteZap),
            other => Err(format!("unknown intent kind {other:?}")),
        }
    }
}

/// A typed message a user signs off-chain for the relayer to execute.
pub trait Intent {
    const KIND: IntentKind;
    const SCHEMA: Schema;

    fn signer(&self) -> Address;
    fn nonce(&self) -> U256;
    fn deadline(&self) -> u64;

    /// One ABI word per schema field, in schema order.
    fn encode_words(&self) -> Vec<B256>;

    fn struct_hash(&self) -> B256 {
        Self::SCHEMA.hash_struct(&self.encode_words())
    }

    /// The digest the signer signs; also used as the intent's idempotency reference.
    fn signing_digest(&self, domain: &Domain) -> B256 {
        domain.signing_digest(self.struct_hash())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProposal {
    pub proposer: Address,
    pub market_id: B256,
    pub title: String,
    pub description: String,
    #[serde(with = "crate::serde_u256")]
    pub stake_amount: U256,
    #[serde(with = "crate::serde_u256")]
    pub nonce: U256,
    pub deadline: u64,
}

impl Intent for CreateProposal {
    const KIND: IntentKind = IntentKind::CreateProposal;
    const SCHEMA: Schema = Schema {
        primary_type: "CreateProposal",
        fields: &[
            Field::new("address", "proposer"),
            Field::new("bytes32", "marketId"),
            Field::new("string", "title"),
            Field::new("string", "description"),
            Field::new("uint256", "stakeAmount"),
            Field::new("uint256", "nonce"),
            Field::new("uint256", "deadline"),
        ],
    };

    fn signer(&self) -> Address {
        self.proposer
    }

    fn nonce(&self) -> U256 {
        self.nonce
    }

    fn deadline(&self) -> u64 {
        self.deadline
    }

    fn encode_words(&self) -> Vec<B256> {
        vec![
            word_address(self.proposer),
            self.market_id,
            word_string(&self.title),
            word_string(&self.description),
            word_u256(self.stake_amount),
            word_u256(self.nonce),
            word_u256(U256::from(self.deadline)),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVote {
    #[serde(with = "crate::serde_u256")]
    pub proposal_id: U256,
    pub support: bool,
    pub voter: Address,
    #[serde(with = "crate::serde_u256")]
    pub nonce: U256,
    pub deadline: u64,
}

impl Intent for CastVote {
    const KIND: IntentKind = IntentKind::CastVote;
    const SCHEMA: Schema = Schema {
        primary_type: "CastVote",
        fields: &[
            Field::new("uint256", "proposalId"),
            Field::new("bool", "support"),
            Field::new("address", "voter"),
            Field::new("uint256", "nonce"),
            Field::new("uint256", "deadline"),
        ],
    };

    fn signer(&self) -> Address {
        self.voter
    }

    fn nonce(&self) -> U256 {
        self.nonce
    }

    fn deadline(&self) -> u64 {
        self.deadline
    }

    fn encode_words(&self) -> Vec<B256> {
        vec![
            word_u256(self.proposal_id),
            word_bool(self.support),
            word_address(self.voter),
            word_u256(self.nonce),
            word_u256(U256::from(self.deadline)),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteZap {
    pub user: Address,
    #[serde(with = "crate::serde_u256")]
    pub wld_amount: U256,
    #[serde(rename = "minUSDC", with = "crate::serde_u256")]
    pub min_usdc: U256,
    pub condition_id: B256,
    pub outcome_index: u64,
    #[serde(with = "crate::serde_u256")]
    pub min_shares_out: U256,
    #[serde(with = "crate::serde_u256")]
    pub nonce: U256,
    pub deadline: u64,
}

impl Intent for ExecuteZap {
    const KIND: IntentKind = IntentKind::ExecuteZap;
    const SCHEMA: Schema = Schema {
        primary_type: "Zap",
        fields: &[
            Field::new("address", "user"),
            Field::new("uint256", "wldAmount"),
            Field::new("uint256", "minUSDC"),
            Field::new("bytes32", "conditionId"),
            Field::new("uint256", "outcomeIndex"),
            Field::new("uint256", "minSharesOut"),
            Field::new("uint256", "nonce"),
            Field::new("uint256", "deadline"),
        ],
    };

    fn signer(&self) -> Address {
        self.user
    }

    fn nonce(&self) -> U256 {
        self.nonce
    }

    fn deadline(&self) -> u64 {
        self.deadline
    }

    fn encode_words(&self) -> Vec<B256> {
        vec![
            word_address(self.user),
            word_u256(self.wld_amount),
            word_u256(self.min_usdc),
            self.condition_id,
            word_u256(U256::from(self.outcome_index)),
            word_u256(self.min_shares_out),
            word_u256(self.nonce),
            word_u256(U256::from(self.deadline)),
        ]
    }
}
