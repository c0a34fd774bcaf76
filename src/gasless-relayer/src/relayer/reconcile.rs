//! Catching persisted relays up with the chain after restarts and lost trackers.

use alloy_primitives::B256;
use tracing::{debug, warn};

use super::{finalize::finalize, FailureKind, Pipeline, RelayError};
use crate::{
    contracts,
    store::{RelayRecord, RelayStatus},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub confirmed: usize,
    pub failed: usize,
    pub still_pending: usize,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.confirmed == 0 && self.failed == 0 && self.still_pending == 0
    }

    fn count(&mut self, status: RelayStatus) {
        match status {
            RelayStatus::Confirmed => self.confirmed += 1,
            RelayStatus::Failed => self.failed += 1,
            RelayStatus::PendingRelay | RelayStatus::Submitted => self.still_pending += 1,
        }
    }
}

pub(crate) async fn reconcile(p: &Pipeline, include_pending: bool) -> Result<ReconcileReport, RelayError> {
    let mut report = ReconcileReport::default();

    for row in p.store.relays_in_status(RelayStatus::Submitted)? {
        match reconcile_submitted(p, &row).await {
            Ok(status) => report.count(status),
            Err(err) => warn!(relay_id = %row.id, %err, "could not reconcile submitted relay"),
        }
    }

    if include_pending {
        for row in p.store.relays_in_status(RelayStatus::PendingRelay)? {
            match reconcile_pending(p, &row).await {
                Ok(status) => report.count(status),
                Err(err) => warn!(relay_id = %row.id, %err, "could not reconcile pending relay"),
            }
        }
    }

    Ok(report)
}

async fn reconcile_submitted(p: &Pipeline, row: &RelayRecord) -> Result<RelayStatus, RelayError> {
    let Some(hash) = row.tx_hash else {
        return Ok(row.status);
    };
    // slot first, receipt second: a tx mined between the two reads is still found
    let consumed = match row.relayer_nonce {
        Some(nonce) => slot_consumed(p, nonce).await?,
        None => false,
    };
    if let Some(receipt) = p.chain.receipt(hash).await? {
        return finalize(p, row.id, &receipt).await;
    }
    if let (true, Some(nonce)) = (consumed, row.relayer_nonce) {
        return settle_consumed_slot(p, row, hash, nonce).await;
    }
    debug!(relay_id = %row.id, tx_hash = %hash, "relay still awaiting inclusion");
    Ok(row.status)
}

/// Resolve a row the worker never finished: the process died between persisting it and
/// recording the broadcast.
async fn reconcile_pending(p: &Pipeline, row: &RelayRecord) -> Result<RelayStatus, RelayError> {
    let (Some(hash), Some(nonce)) = (row.prepared_hash, row.relayer_nonce) else {
        p.fail(row.id, FailureKind::Interrupted, "interrupted before broadcast", None)?;
        return Ok(RelayStatus::Failed);
    };
    let consumed = slot_consumed(p, nonce).await?;
    if let Some(receipt) = p.chain.receipt(hash).await? {
        return finalize(p, row.id, &receipt).await;
    }
    if consumed {
        return settle_consumed_slot(p, row, hash, nonce).await;
    }
    if p.chain.transaction_count(p.chain.relayer_address(), true).await? > nonce {
        p.store.mark_submitted(row.id, hash)?;
        return Ok(RelayStatus::Submitted);
    }
    p.fail(row.id, FailureKind::Interrupted, "interrupted before broadcast", None)?;
    Ok(RelayStatus::Failed)
}

async fn slot_consumed(p: &Pipeline, relayer_nonce: u64) -> Result<bool, RelayError> {
    Ok(p.chain.transaction_count(p.chain.relayer_address(), false).await? > relayer_nonce)
}

/// The relayer nonce slot is filled but no receipt for `hash` has been seen.
///
/// Only declared DROPPED once a second receipt lookup misses and the signer's intent nonce is still
/// unused on-chain. Otherwise the row stays SUBMITTED for the next pass.
async fn settle_consumed_slot(
    p: &Pipeline,
    row: &RelayRecord,
    hash: B256,
    relayer_nonce: u64,
) -> Result<RelayStatus, RelayError> {
    if let Some(receipt) = p.chain.receipt(hash).await? {
        return finalize(p, row.id, &receipt).await;
    }
    let onchain = contracts::intent_nonce(p.chain.as_ref(), p.settings.entrypoint, row.signer).await?;
    if onchain > row.intent_nonce {
        warn!(relay_id = %row.id, tx_hash = %hash, "intent nonce is used but the receipt is not visible yet");
        if row.status == RelayStatus::PendingRelay {
            p.store.mark_submitted(row.id, hash)?;
        }
        return Ok(RelayStatus::Submitted);
    }
    p.fail(
        row.id,
        FailureKind::Dropped,
        &format!("relayer nonce {relayer_nonce} was consumed by another transaction"),
        None,
    )?;
    Ok(RelayStatus::Failed)
}
