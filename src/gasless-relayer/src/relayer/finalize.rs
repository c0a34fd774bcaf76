//! Recording a mined relay: decoded results on success, the revert reason on failure.

use alloy_primitives::U256;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{FailureKind, Pipeline, RelayContext, RelayError, RelayResult};
use crate::{
    chain::TxReceipt,
    contracts::{decode_revert, Revert},
    events::EntrypointEvent,
    nonce,
    store::{ProposalRecord, RelayRecord, RelayStatus, StoreError, VoteRecord},
};

/// Settle relay `id` against its receipt. Idempotent: a row that is already final is left alone.
pub(crate) async fn finalize(p: &Pipeline, id: Uuid, receipt: &TxReceipt) -> Result<RelayStatus, RelayError> {
    let record = p
        .store
        .relay(id)?
        .ok_or_else(|| StoreError::Corrupt(format!("relay {id} is missing")))?;
    if record.status.is_final() {
        return Ok(record.status);
    }
    if record.status == RelayStatus::PendingRelay {
        p.store.mark_submitted(id, receipt.tx_hash)?;
    }

    if receipt.success {
        confirm(p, &record, receipt)?;
        Ok(RelayStatus::Confirmed)
    } else {
        let revert = match p
            .chain
            .replay_revert(p.settings.entrypoint, record.calldata.clone(), receipt.block_number)
            .await
        {
            Ok(Some(data)) => decode_revert(&data),
            Ok(None) => Revert {
                nonce_conflict: false,
                message: "execution reverted".to_string(),
            },
            Err(err) => {
                warn!(relay_id = %id, %err, "could not replay reverted call");
                Revert {
                    nonce_conflict: false,
                    message: "execution reverted".to_string(),
                }
            }
        };
        let kind = if revert.nonce_conflict {
            FailureKind::NonceAlreadyUsed
        } else {
            FailureKind::ChainRevert
        };
        p.fail(id, kind, &revert.message, Some((receipt.block_number, receipt.gas_used)))?;
        Ok(RelayStatus::Failed)
    }
}

fn confirm(p: &Pipeline, record: &RelayRecord, receipt: &TxReceipt) -> Result<(), RelayError> {
    let context: RelayContext = serde_json::from_value(record.context.clone())
        .map_err(|e| StoreError::Corrupt(format!("relay context: {e}")))?;
    let events = p.registry.decode_all(&receipt.logs);
    let result = record_events(p, record, receipt, &context, &events)?;
    let json = serde_json::to_value(&result).map_err(|e| StoreError::Corrupt(e.to_string()))?;

    p.store.mark_confirmed(record.id, receipt.block_number, receipt.gas_used, &json)?;
    nonce::advance_cache(&p.store, record.signer, record.intent_nonce)?;
    info!(
        relay_id = %record.id,
        kind = %record.kind,
        tx_hash = %receipt.tx_hash,
        block = receipt.block_number,
        gas_used = %receipt.gas_used,
        "relay confirmed"
    );
    Ok(())
}

fn record_events(
    p: &Pipeline,
    record: &RelayRecord,
    receipt: &TxReceipt,
    context: &RelayContext,
    events: &[EntrypointEvent],
) -> Result<RelayResult, RelayError> {
    let mut result = RelayResult::default();
    match context {
        RelayContext::CreateProposal { title, description } => {
            let created = events.iter().find_map(|e| match e {
                EntrypointEvent::ProposalCreated {
                    proposal_id,
                    proposer,
                    market_id,
                    stake_amount,
                } => Some((*proposal_id, *proposer, *market_id, *stake_amount)),
                _ => None,
            });
            match created {
                Some((proposal_id, proposer, market_id, stake_amount)) => {
                    p.store.insert_proposal(&ProposalRecord {
                        proposal_id,
                        proposer,
                        market_id,
                        title: title.clone(),
                        description: description.clone(),
                        stake_amount,
                        relay_id: record.id,
                        tx_hash: receipt.tx_hash,
                        block_number: receipt.block_number,
                    })?;
                    result.proposal_id = Some(proposal_id);
                }
                None => warn!(relay_id = %record.id, "receipt has no ProposalCreated event"),
            }
        }
        RelayContext::CastVote {
            proposal_id,
            support,
            nullifier_hash,
        } => {
            let emitted = events.iter().find_map(|e| match e {
                EntrypointEvent::VoteCast {
                    proposal_id,
                    voter,
                    support,
                    nullifier_hash,
                } => Some((*proposal_id, *voter, *support, *nullifier_hash)),
                _ => None,
            });
            let (proposal_id, voter, support, nullifier_hash) = emitted.unwrap_or_else(|| {
                warn!(relay_id = %record.id, "receipt has no VoteCast event, recording the signed vote");
                (*proposal_id, record.signer, *support, *nullifier_hash)
            });
            let vote = VoteRecord {
                id: Uuid::new_v4(),
                proposal_id,
                voter,
                support,
                nullifier_hash,
                relay_id: record.id,
                tx_hash: receipt.tx_hash,
                block_number: receipt.block_number,
            };
            result.vote_id = Some(p.store.insert_vote(&vote)?);
            result.vote = Some(vote.vote_label().to_string());
        }
        RelayContext::ExecuteZap {
            expected_position_id, ..
        } => {
            let executed = events.iter().find_map(|e| match e {
                EntrypointEvent::ZapExecuted {
                    shares_out,
                    position_id,
                    ..
                } => Some((*shares_out, *position_id)),
                _ => None,
            });
            match executed {
                Some((shares_out, position_id)) => {
                    check_position_id(record.id, *expected_position_id, position_id);
                    result.shares_received = Some(shares_out);
                    result.position_id = Some(position_id);
                }
                None => warn!(relay_id = %record.id, "receipt has no ZapExecuted event"),
            }
        }
    }
    Ok(result)
}

fn check_position_id(relay_id: Uuid, expected: Option<U256>, emitted: U256) {
    if let Some(expected) = expected {
        if expected != emitted {
            error!(%relay_id, %expected, %emitted, "emitted position id differs from the locally derived one");
        }
    }
}
