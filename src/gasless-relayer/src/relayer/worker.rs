//! The wallet actor: pre-flight checks, signing and broadcast, one job at a time.

use std::{sync::Arc, time::Duration};

use alloy_primitives::{Bytes, B256};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{tracker, with_headroom, FailureKind, Pipeline, RelayError, RelayJob};
use crate::{
    chain::{ChainError, SignedTx, TxRequest},
    contracts::decode_revert,
};

enum Submission {
    Sent { signed: SignedTx, relayer_nonce: u64 },
    Rejected(FailureKind, String),
}

enum Broadcast {
    Sent,
    /// Handed to the node, but whether it holds the tx is unknown. Tracked like a sent tx.
    Unknown(String),
    /// Every send was refused and the nonce slot is still empty.
    Failed(String),
}

pub(crate) struct Worker {
    pipeline: Arc<Pipeline>,
    jobs: mpsc::Receiver<RelayJob>,
    /// Next relayer nonce; `None` forces a resync from the node.
    next_nonce: Option<u64>,
}

impl Worker {
    pub fn new(pipeline: Arc<Pipeline>, jobs: mpsc::Receiver<RelayJob>) -> Self {
        Self {
            pipeline,
            jobs,
            next_nonce: None,
        }
    }

    pub async fn run(mut self) {
        info!(relayer = %self.pipeline.chain.relayer_address(), "relay worker started");
        while let Some(job) = self.jobs.recv().await {
            self.handle(job).await;
        }
        info!("relay worker stopped");
    }

    async fn handle(&mut self, job: RelayJob) {
        let RelayJob {
            id,
            calldata,
            reservation,
            notify,
        } = job;

        match self.submit(id, &calldata).await {
            Ok(Submission::Sent { signed, relayer_nonce }) => {
                self.pipeline.publish(id, &notify);
                let inflight = tracker::InFlight {
                    id,
                    signed,
                    relayer_nonce,
                    reservation,
                    notify,
                };
                tokio::spawn(tracker::track(self.pipeline.clone(), inflight));
            }
            Ok(Submission::Rejected(kind, message)) => {
                if let Err(err) = self.pipeline.fail(id, kind, &message, None) {
                    error!(relay_id = %id, %err, "could not record relay failure");
                }
                self.pipeline.publish(id, &notify);
            }
            // only steps before the first send can fail here
            Err(err) => {
                self.next_nonce = None;
                if let Err(store_err) = self.pipeline.fail(id, FailureKind::BroadcastFailed, &err.to_string(), None) {
                    error!(relay_id = %id, %err, %store_err, "could not record relay failure");
                }
                self.pipeline.publish(id, &notify);
            }
        }
    }

    async fn submit(&mut self, id: Uuid, calldata: &Bytes) -> Result<Submission, RelayError> {
        let p = self.pipeline.clone();
        let relayer = p.chain.relayer_address();
        let entrypoint = p.settings.entrypoint;

        let balance = p.chain.balance(relayer).await?;
        if balance < p.settings.min_relayer_balance {
            return Ok(Submission::Rejected(
                FailureKind::RelayerUnderfunded,
                format!(
                    "relayer balance {balance} is below the minimum {}",
                    p.settings.min_relayer_balance
                ),
            ));
        }

        let estimate = match p.chain.estimate_gas(entrypoint, calldata.clone()).await {
            Ok(gas) => gas,
            Err(ChainError::Reverted(data)) => {
                let revert = decode_revert(&data);
                let kind = if revert.nonce_conflict {
                    FailureKind::NonceAlreadyUsed
                } else {
                    FailureKind::ChainRevert
                };
                return Ok(Submission::Rejected(kind, revert.message));
            }
            Err(err) => return Err(err.into()),
        };
        let gas_limit = with_headroom(estimate, p.settings.gas_headroom_pct);

        let nonce = match self.next_nonce {
            Some(n) => n,
            None => p.chain.transaction_count(relayer, true).await?,
        };
        let signed = p
            .chain
            .sign(&TxRequest {
                to: entrypoint,
                data: calldata.clone(),
                nonce,
                gas_limit,
            })
            .await?;
        p.store.mark_prepared(id, nonce, signed.hash)?;
        debug!(relay_id = %id, relayer_nonce = nonce, gas_limit, tx_hash = %signed.hash, "transaction prepared");

        let outcome = self.broadcast(&signed, nonce).await;
        match outcome {
            Broadcast::Sent => {
                self.next_nonce = Some(nonce + 1);
                info!(relay_id = %id, tx_hash = %signed.hash, relayer_nonce = nonce, "transaction broadcast");
            }
            Broadcast::Unknown(reason) => {
                self.next_nonce = None;
                warn!(relay_id = %id, tx_hash = %signed.hash, relayer_nonce = nonce, %reason, "broadcast outcome unknown, tracking anyway");
            }
            Broadcast::Failed(reason) => {
                self.next_nonce = None;
                return Ok(Submission::Rejected(FailureKind::BroadcastFailed, reason));
            }
        }
        if let Err(err) = p.store.mark_submitted(id, signed.hash) {
            // the tracker's finalize step submits the row before confirming it
            error!(relay_id = %id, %err, "could not mark relay submitted");
        }
        Ok(Submission::Sent {
            signed,
            relayer_nonce: nonce,
        })
    }

    /// Send `signed`, retrying only while its relayer nonce slot is still unfilled.
    ///
    /// Once the bytes have gone out, an answer the node cannot confirm never fails the relay.
    async fn broadcast(&self, signed: &SignedTx, nonce: u64) -> Broadcast {
        let p = &self.pipeline;
        let mut last_error = String::from("not broadcast");
        let mut timed_out = false;

        for attempt in 0..=p.settings.broadcast_retries {
            if attempt > 0 {
                match self.slot_outcome(signed.hash, nonce).await {
                    Ok(Some(outcome)) => return outcome,
                    Ok(None) => {}
                    Err(err) => {
                        warn!(attempt, %err, "could not check the relayer nonce slot");
                        return Broadcast::Unknown(format!("{last_error}; slot check failed: {err}"));
                    }
                }
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
            }
            match tokio::time::timeout(p.settings.broadcast_timeout, p.chain.send_raw(signed.raw.clone())).await {
                Ok(Ok(hash)) => {
                    if hash != signed.hash {
                        warn!(expected = %signed.hash, reported = %hash, "node reported a different tx hash");
                    }
                    return Broadcast::Sent;
                }
                Ok(Err(err)) => {
                    warn!(attempt, %err, "broadcast failed");
                    last_error = err.to_string();
                }
                Err(_) => {
                    warn!(attempt, "broadcast timed out");
                    timed_out = true;
                    last_error = "broadcast timed out".to_string();
                }
            }
        }

        match self.slot_outcome(signed.hash, nonce).await {
            Ok(Some(outcome)) => outcome,
            // a timed-out send may still land in the mempool after this check
            Ok(None) if timed_out => Broadcast::Unknown(last_error),
            Ok(None) => Broadcast::Failed(last_error),
            Err(err) => Broadcast::Unknown(format!("{last_error}; slot check failed: {err}")),
        }
    }

    /// `Some` once the relayer nonce slot is filled or our tx is pending.
    async fn slot_outcome(&self, hash: B256, nonce: u64) -> Result<Option<Broadcast>, ChainError> {
        let p = &self.pipeline;
        let relayer = p.chain.relayer_address();
        if p.chain.transaction_count(relayer, false).await? > nonce {
            return Ok(Some(match p.chain.receipt(hash).await? {
                Some(_) => Broadcast::Sent,
                // receipt indexes can trail the account nonce; reconciliation tells the two apart
                None => Broadcast::Unknown(format!("relayer nonce {nonce} is used but no receipt for {hash} yet")),
            }));
        }
        if p.chain.transaction_count(relayer, true).await? > nonce {
            debug!(tx_hash = %hash, "transaction already in the mempool");
            return Ok(Some(Broadcast::Sent));
        }
        Ok(None)
    }
}
