//! Confirmation tracking for one broadcast transaction.

use std::sync::Arc;

use tokio::{sync::watch, time::Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{finalize::finalize, Pipeline, RelaySnapshot};
use crate::{chain::SignedTx, nonce::NonceReservation};

pub(crate) struct InFlight {
    pub id: Uuid,
    pub signed: SignedTx,
    pub relayer_nonce: u64,
    /// Held until the outcome is final so the signer's next intent waits for this one.
    pub reservation: NonceReservation,
    pub notify: watch::Sender<RelaySnapshot>,
}

pub(crate) async fn track(pipeline: Arc<Pipeline>, inflight: InFlight) {
    let InFlight {
        id,
        signed,
        relayer_nonce,
        reservation,
        notify,
    } = inflight;
    let settings = &pipeline.settings;
    let relayer = pipeline.chain.relayer_address();
    let started = Instant::now();
    let mut last_broadcast = Instant::now();

    loop {
        match pipeline.chain.receipt(signed.hash).await {
            Ok(Some(receipt)) => {
                match finalize(&pipeline, id, &receipt).await {
                    Ok(status) => info!(relay_id = %id, %status, block = receipt.block_number, "relay settled"),
                    Err(err) => error!(relay_id = %id, %err, "could not record relay outcome"),
                }
                pipeline.publish(id, &notify);
                break;
            }
            Ok(None) => {}
            Err(err) => warn!(relay_id = %id, %err, "receipt lookup failed"),
        }

        if started.elapsed() >= settings.confirmation_timeout {
            warn!(relay_id = %id, tx_hash = %signed.hash, "no receipt before timeout, leaving relay to reconciliation");
            break;
        }

        if last_broadcast.elapsed() >= settings.rebroadcast_interval {
            last_broadcast = Instant::now();
            match pipeline.chain.transaction_count(relayer, false).await {
                Ok(mined) if mined <= relayer_nonce => {
                    debug!(relay_id = %id, tx_hash = %signed.hash, "rebroadcasting");
                    if let Err(err) = pipeline.chain.send_raw(signed.raw.clone()).await {
                        debug!(relay_id = %id, %err, "rebroadcast rejected");
                    }
                }
                Ok(_) => {}
                Err(err) => warn!(relay_id = %id, %err, "nonce lookup failed"),
            }
        }

        tokio::time::sleep(settings.receipt_poll_interval).await;
    }

    drop(reservation);
}
