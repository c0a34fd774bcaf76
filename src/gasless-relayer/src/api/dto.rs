//! Request and response bodies

use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, B256, U256};
use market_primitives::{serde_u256, CastVote, CreateProposal, ExecuteZap, IntentKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    humanity::WorldIdProof,
    relayer::{RelayResult, RelaySnapshot},
    rewards::{ClaimProof, ClaimableReward},
    store::{DistributionStatus, RelayRecord, RelayStatus},
};

/// A 256-bit amount on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(#[serde(with = "serde_u256")] pub U256);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalIntentRequest {
    #[serde(flatten)]
    pub intent: CreateProposal,
    pub signature: Bytes,
    #[serde(default)]
    pub chain_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteIntentRequest {
    pub proposal_id: Amount,
    pub support: bool,
    pub signer_address: Address,
    pub nonce: Amount,
    pub deadline: u64,
    pub signature: Bytes,
    pub world_id_proof: WorldIdProof,
    #[serde(default)]
    pub chain_id: Option<u64>,
}

impl VoteIntentRequest {
    pub fn intent(&self) -> CastVote {
        CastVote {
            proposal_id: self.proposal_id.0,
            support: self.support,
            voter: self.signer_address,
            nonce: self.nonce.0,
            deadline: self.deadline,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZapIntentRequest {
    #[serde(flatten)]
    pub intent: ExecuteZap,
    pub signature: Bytes,
    #[serde(default)]
    pub chain_id: Option<u64>,
}

/// Outcome of a relay request. Kind-specific results are flattened in.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub relay_id: Uuid,
    pub status: RelayStatus,
    pub tx_hash: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", with = "serde_u256::option")]
    pub gas_used: Option<U256>,
    #[serde(flatten)]
    pub result: RelayResult,
}

impl From<RelaySnapshot> for RelayResponse {
    fn from(s: RelaySnapshot) -> Self {
        Self {
            relay_id: s.id,
            status: s.status,
            tx_hash: s.tx_hash,
            block_number: s.block_number,
            gas_used: s.gas_used,
            result: s.result,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddressQuery {
    pub address: Address,
}

#[derive(Debug, Serialize)]
pub struct NonceResponse {
    pub address: Address,
    #[serde(with = "serde_u256")]
    pub nonce: U256,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayView {
    pub id: Uuid,
    pub kind: IntentKind,
    pub signer: Address,
    #[serde(with = "serde_u256")]
    pub intent_nonce: U256,
    pub chain_id: u64,
    pub status: RelayStatus,
    pub relayer_nonce: Option<u64>,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
    #[serde(with = "serde_u256::option")]
    pub gas_used: Option<U256>,
    pub result: Option<serde_json::Value>,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<RelayRecord> for RelayView {
    fn from(r: RelayRecord) -> Self {
        Self {
            id: r.id,
            kind: r.kind,
            signer: r.signer,
            intent_nonce: r.intent_nonce,
            chain_id: r.chain_id,
            status: r.status,
            relayer_nonce: r.relayer_nonce,
            tx_hash: r.tx_hash,
            block_number: r.block_number,
            gas_used: r.gas_used,
            result: r.result,
            error_kind: r.error_kind,
            error: r.error,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub address: Address,
    pub distribution_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimProofResponse {
    pub distribution_id: Uuid,
    pub merkle_root: B256,
    #[serde(with = "serde_u256")]
    pub amount: U256,
    pub merkle_proof: Vec<B256>,
    pub leaf_index: usize,
}

impl From<ClaimProof> for ClaimProofResponse {
    fn from(p: ClaimProof) -> Self {
        Self {
            distribution_id: p.distribution_id,
            merkle_root: p.root,
            amount: p.amount,
            merkle_proof: p.proof,
            leaf_index: p.leaf_index,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimableRewardDto {
    pub distribution_id: Uuid,
    pub merkle_root: B256,
    #[serde(with = "serde_u256")]
    pub amount: U256,
    pub period_start: u64,
    pub period_end: u64,
    pub expires_at: u64,
}

impl From<ClaimableReward> for ClaimableRewardDto {
    fn from(r: ClaimableReward) -> Self {
        Self {
            distribution_id: r.distribution_id,
            merkle_root: r.root,
            amount: r.amount,
            period_start: r.period_start,
            period_end: r.period_end,
            expires_at: r.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimableResponse {
    pub rewards: Vec<ClaimableRewardDto>,
    #[serde(with = "serde_u256")]
    pub total_claimable: U256,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDistributionRequest {
    /// Address (hex string) to amount.
    pub leaves: BTreeMap<String, Amount>,
    pub period_start: u64,
    pub period_end: u64,
    pub expires_at: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionResponse {
    pub distribution_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<B256>,
    pub status: DistributionStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub relayer: Address,
    pub chain_id: u64,
    pub queued: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn proposal_request_flattens_the_intent() {
        let req: ProposalIntentRequest = serde_json::from_value(json!({
            "proposer": "0x1111111111111111111111111111111111111111",
            "marketId": "0x2222222222222222222222222222222222222222222222222222222222222222",
            "title": "t",
            "description": "d",
            "stakeAmount": "1000",
            "nonce": "0",
            "deadline": 1700000000u64,
            "signature": "0x00",
            "chainId": 480
        }))
        .unwrap();
        assert_eq!(req.intent.stake_amount, U256::from(1000u32));
        assert_eq!(req.chain_id, Some(480));
        assert_eq!(req.signature.len(), 1);
    }

    #[test]
    fn zap_request_uses_wire_names() {
        let req: ZapIntentRequest = serde_json::from_value(json!({
            "user": "0x1111111111111111111111111111111111111111",
            "wldAmount": "10",
            "minUSDC": "9",
            "conditionId": "0x2222222222222222222222222222222222222222222222222222222222222222",
            "outcomeIndex": 1,
            "minSharesOut": "8",
            "nonce": "0x1",
            "deadline": 1700000000u64,
            "signature": "0x"
        }))
        .unwrap();
        assert_eq!(req.intent.min_usdc, U256::from(9u8));
        assert_eq!(req.intent.nonce, U256::from(1u8));
        assert_eq!(req.chain_id, None);
    }

    #[test]
    fn relay_response_flattens_results() {
        let resp = RelayResponse {
            relay_id: Uuid::nil(),
            status: RelayStatus::Confirmed,
            tx_hash: Some(B256::ZERO),
            block_number: Some(7),
            gas_used: Some(U256::from(21_000u32)),
            result: RelayResult {
                proposal_id: Some(U256::from(3u8)),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "CONFIRMED");
        assert_eq!(json["proposalId"], "3");
        assert_eq!(json["gasUsed"], "21000");
        assert_eq!(json["blockNumber"], 7);
    }
}
