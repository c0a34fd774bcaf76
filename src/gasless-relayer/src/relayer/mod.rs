//! Relayer execution pipeline.
//!
//! A single worker task owns the hot wallet and its transaction nonce. Jobs reach it through a
//! bounded queue; once a transaction is broadcast the worker hands it to a tracker task and moves
//! on, so confirmations never hold up later jobs. Every step is persisted before the next one
//! starts, which is what lets [`Relayer::reconcile`] pick up after a crash.

mod finalize;
mod reconcile;
mod tracker;
mod worker;

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use alloy_primitives::{Address, Bytes, B256, U256};
use market_primitives::serde_u256;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    chain::{ChainClient, ChainError},
    contracts::constants::DEFAULT_GAS_HEADROOM_PCT,
    events::EventRegistry,
    nonce::NonceReservation,
    store::{RelayRecord, RelayStatus, Store, StoreError},
};

pub use reconcile::ReconcileReport;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay queue is full")]
    Busy,
    #[error("relay worker has stopped")]
    Stopped,
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a relay ended in FAILED. Stored as `error_kind` on the row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    ChainRevert,
    NonceAlreadyUsed,
    RelayerUnderfunded,
    BroadcastFailed,
    Interrupted,
    Dropped,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::ChainRevert => "CHAIN_REVERT",
            FailureKind::NonceAlreadyUsed => "NONCE_ALREADY_USED",
            FailureKind::RelayerUnderfunded => "RELAYER_UNDERFUNDED",
            FailureKind::BroadcastFailed => "BROADCAST_FAILED",
            FailureKind::Interrupted => "INTERRUPTED",
            FailureKind::Dropped => "DROPPED",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CHAIN_REVERT" => FailureKind::ChainRevert,
            "NONCE_ALREADY_USED" => FailureKind::NonceAlreadyUsed,
            "RELAYER_UNDERFUNDED" => FailureKind::RelayerUnderfunded,
            "BROADCAST_FAILED" => FailureKind::BroadcastFailed,
            "INTERRUPTED" => FailureKind::Interrupted,
            "DROPPED" => FailureKind::Dropped,
            other => return Err(format!("unknown failure kind {other:?}")),
        })
    }
}

/// Per-kind data the confirmation step needs beyond what the receipt carries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RelayContext {
    CreateProposal {
        title: String,
        description: String,
    },
    CastVote {
        #[serde(with = "serde_u256")]
        proposal_id: U256,
        support: bool,
        #[serde(with = "serde_u256")]
        nullifier_hash: U256,
    },
    ExecuteZap {
        condition_id: B256,
        outcome_index: u64,
        #[serde(with = "serde_u256::option")]
        expected_position_id: Option<U256>,
    },
}

/// Decoded outcome of a confirmed relay.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResult {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_u256::option")]
    pub proposal_id: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_u256::option")]
    pub shares_received: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_u256::option")]
    pub position_id: Option<U256>,
}

/// Point-in-time view of a relay, as pushed to waiting callers.
#[derive(Clone, Debug, PartialEq)]
pub struct RelaySnapshot {
    pub id: Uuid,
    pub status: RelayStatus,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub result: RelayResult,
    pub failure: Option<(FailureKind, String)>,
}

impl RelaySnapshot {
    pub fn pending(id: Uuid) -> Self {
        Self {
            id,
            status: RelayStatus::PendingRelay,
            tx_hash: None,
            block_number: None,
            gas_used: None,
            result: RelayResult::default(),
            failure: None,
        }
    }
}

impl From<&RelayRecord> for RelaySnapshot {
    fn from(rec: &RelayRecord) -> Self {
        let result = rec
            .result
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let failure = match (&rec.error_kind, &rec.error) {
            (Some(kind), message) => kind
                .parse()
                .ok()
                .map(|kind| (kind, message.clone().unwrap_or_default())),
            _ => None,
        };
        Self {
            id: rec.id,
            status: rec.status,
            tx_hash: rec.tx_hash,
            block_number: rec.block_number,
            gas_used: rec.gas_used,
            result,
            failure,
        }
    }
}

/// Handle a caller keeps for one relay.
pub struct RelayTicket {
    id: Uuid,
    updates: watch::Receiver<RelaySnapshot>,
}

impl RelayTicket {
    pub(crate) fn channel(id: Uuid) -> (watch::Sender<RelaySnapshot>, Self) {
        let (tx, rx) = watch::channel(RelaySnapshot::pending(id));
        (tx, Self { id, updates: rx })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn current(&self) -> RelaySnapshot {
        self.updates.borrow().clone()
    }

    /// Wait up to `timeout` for a final status and return the latest snapshot either way.
    pub async fn wait_final(&mut self, timeout: Duration) -> RelaySnapshot {
        let _ = tokio::time::timeout(timeout, self.updates.wait_for(|s| s.status.is_final())).await;
        self.current()
    }
}

#[derive(Clone, Debug)]
pub struct RelaySettings {
    pub entrypoint: Address,
    /// Collateral the zap flow buys positions in; used to derive the expected position id.
    pub collateral_token: Address,
    pub min_relayer_balance: U256,
    pub gas_headroom_pct: u64,
    pub queue_capacity: usize,
    pub broadcast_timeout: Duration,
    pub broadcast_retries: u32,
    pub receipt_poll_interval: Duration,
    pub rebroadcast_interval: Duration,
    pub confirmation_timeout: Duration,
}

impl RelaySettings {
    pub fn new(entrypoint: Address, collateral_token: Address) -> Self {
        Self {
            entrypoint,
            collateral_token,
            min_relayer_balance: U256::ZERO,
            gas_headroom_pct: DEFAULT_GAS_HEADROOM_PCT,
            queue_capacity: 256,
            broadcast_timeout: Duration::from_secs(10),
            broadcast_retries: 3,
            receipt_poll_interval: Duration::from_secs(2),
            rebroadcast_interval: Duration::from_secs(30),
            confirmation_timeout: Duration::from_secs(180),
        }
    }
}

/// `estimate * (100 + pct) / 100`, saturating.
pub fn with_headroom(estimate: u64, pct: u64) -> u64 {
    let scaled = u128::from(estimate) * (100u128 + u128::from(pct)) / 100;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

pub(crate) struct RelayJob {
    pub id: Uuid,
    pub calldata: Bytes,
    pub reservation: NonceReservation,
    pub notify: watch::Sender<RelaySnapshot>,
}

/// Cheap, cloneable sender side of the worker queue.
#[derive(Clone)]
pub struct RelayerHandle {
    jobs: mpsc::Sender<RelayJob>,
}

/// A reserved queue slot. Holding one guarantees the following send cannot fail with `Busy`.
pub struct RelaySlot<'a> {
    permit: mpsc::Permit<'a, RelayJob>,
}

impl RelayerHandle {
    pub fn try_reserve(&self) -> Result<RelaySlot<'_>, RelayError> {
        match self.jobs.try_reserve() {
            Ok(permit) => Ok(RelaySlot { permit }),
            Err(mpsc::error::TrySendError::Full(())) => Err(RelayError::Busy),
            Err(mpsc::error::TrySendError::Closed(())) => Err(RelayError::Stopped),
        }
    }

    pub fn queued(&self) -> usize {
        self.jobs.max_capacity() - self.jobs.capacity()
    }
}

impl RelaySlot<'_> {
    pub(crate) fn send(self, job: RelayJob) {
        self.permit.send(job);
    }
}

/// State shared by the worker, trackers and the reconciler.
pub(crate) struct Pipeline {
    pub chain: Arc<dyn ChainClient>,
    pub store: Arc<Store>,
    pub registry: EventRegistry,
    pub settings: RelaySettings,
}

impl Pipeline {
    pub fn publish(&self, id: Uuid, notify: &watch::Sender<RelaySnapshot>) {
        match self.store.relay(id) {
            Ok(Some(rec)) => {
                notify.send_replace(RelaySnapshot::from(&rec));
            }
            Ok(None) => warn!(relay_id = %id, "relay row missing"),
            Err(err) => warn!(relay_id = %id, %err, "could not load relay for notification"),
        }
    }

    pub fn fail(&self, id: Uuid, kind: FailureKind, message: &str, mined: Option<(u64, U256)>) -> Result<(), StoreError> {
        warn!(relay_id = %id, kind = %kind, message, "relay failed");
        self.store.mark_failed(id, kind.as_str(), message, mined)
    }
}

#[derive(Clone)]
pub struct Relayer {
    pipeline: Arc<Pipeline>,
}

impl Relayer {
    pub fn new(chain: Arc<dyn ChainClient>, store: Arc<Store>, settings: RelaySettings) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                registry: EventRegistry::new(settings.entrypoint),
                chain,
                store,
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.pipeline.settings
    }

    /// Spawn the wallet worker. Dropping every handle stops it once the queue drains.
    pub fn start(&self) -> (RelayerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.pipeline.settings.queue_capacity.max(1));
        let worker = worker::Worker::new(self.pipeline.clone(), rx);
        (RelayerHandle { jobs: tx }, tokio::spawn(worker.run()))
    }

    /// Bring persisted relays up to date with the chain.
    ///
    /// `include_pending` also resolves PENDING_RELAY rows, which is only safe before the worker
    /// starts (at boot); the periodic pass looks at SUBMITTED rows only.
    pub async fn reconcile(&self, include_pending: bool) -> Result<ReconcileReport, RelayError> {
        reconcile::reconcile(&self.pipeline, include_pending).await
    }

    pub fn spawn_reconciler(&self, every: Duration) -> JoinHandle<()> {
        let relayer = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match relayer.reconcile(false).await {
                    Ok(report) if report.is_empty() => {}
                    Ok(report) => info!(?report, "reconciled relays"),
                    Err(err) => warn!(%err, "reconciliation pass failed"),
                }
            }
        })
    }
}
