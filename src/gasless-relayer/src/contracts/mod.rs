//! Entrypoint ABI glue: calldata builders, the nonce view and revert decoding.

pub mod constants;
pub mod interfaces;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{SolCall, SolInterface};
use market_primitives::{CastVote, CreateProposal, ExecuteZap};

use crate::chain::{ChainClient, ChainError};

pub use interfaces::IGaslessEntrypoint;

pub fn create_proposal_calldata(intent: &CreateProposal, signature: &[u8]) -> Bytes {
    IGaslessEntrypoint::createProposalWithSigCall {
        proposer: intent.proposer,
        marketId: intent.market_id,
        title: intent.title.clone(),
        description: intent.description.clone(),
        stakeAmount: intent.stake_amount,
        nonce: intent.nonce,
        deadline: U256::from(intent.deadline),
        signature: Bytes::copy_from_slice(signature),
    }
    .abi_encode()
    .into()
}

pub fn cast_vote_calldata(intent: &CastVote, nullifier_hash: U256, signature: &[u8]) -> Bytes {
    IGaslessEntrypoint::castVoteWithSigCall {
        proposalId: intent.proposal_id,
        support: intent.support,
        voter: intent.voter,
        nullifierHash: nullifier_hash,
        nonce: intent.nonce,
        deadline: U256::from(intent.deadline),
        signature: Bytes::copy_from_slice(signature),
    }
    .abi_encode()
    .into()
}

pub fn zap_calldata(intent: &ExecuteZap, signature: &[u8]) -> Bytes {
    IGaslessEntrypoint::zapWithSigCall {
        user: intent.user,
        wldAmount: intent.wld_amount,
        minUSDC: intent.min_usdc,
        conditionId: intent.condition_id,
        outcomeIndex: U256::from(intent.outcome_index),
        minSharesOut: intent.min_shares_out,
        nonce: intent.nonce,
        deadline: U256::from(intent.deadline),
        signature: Bytes::copy_from_slice(signature),
    }
    .abi_encode()
    .into()
}

/// Authoritative next nonce for `signer`, read from the entrypoint.
pub async fn intent_nonce(
    chain: &dyn ChainClient,
    entrypoint: Address,
    signer: Address,
) -> Result<U256, ChainError> {
    let data = IGaslessEntrypoint::noncesCall { owner: signer }.abi_encode();
    let out = chain.call(entrypoint, data.into()).await?;
    let ret = IGaslessEntrypoint::noncesCall::abi_decode_returns(&out, true)
        .map_err(|e| ChainError::Decode(e.to_string()))?;
    Ok(ret.nonce)
}

/// A decoded revert from the entrypoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Revert {
    /// The signer's nonce was already consumed (or never matched).
    pub nonce_conflict: bool,
    pub message: String,
}

pub fn decode_revert(data: &[u8]) -> Revert {
    use IGaslessEntrypoint::IGaslessEntrypointErrors as E;

    let (nonce_conflict, message) = match E::abi_decode(data, true) {
        Ok(E::InvalidNonce(e)) => (
            true,
            format!("InvalidNonce(signer {}, expected {}, provided {})", e.signer, e.expected, e.provided),
        ),
        Ok(E::ExpiredDeadline(e)) => (false, format!("ExpiredDeadline({})", e.deadline)),
        Ok(E::InvalidSigner(e)) => (false, format!("InvalidSigner({})", e.recovered)),
        Ok(E::NullifierUsed(e)) => (false, format!("NullifierUsed({})", e.nullifierHash)),
        Ok(E::SlippageExceeded(e)) => (
            false,
            format!("SlippageExceeded(minimum {}, actual {})", e.minimum, e.actual),
        ),
        Err(_) if data.is_empty() => (false, "execution reverted".to_string()),
        Err(_) => match alloy_sol_types::decode_revert_reason(data) {
            Some(reason) if !reason.is_empty() => (false, reason),
            _ => (false, format!("execution reverted: 0x{}", hex::encode(data))),
        },
    };
    Revert {
        nonce_conflict,
        message,
    }
}
