//! Merkle reward distributions: drafting, publishing, proofs and the one-claim-per-address ledger.
//!
//! A published root is a commitment. Proofs are regenerated from the stored leaves on every
//! request and refused if the regenerated root no longer matches it.

use std::{collections::BTreeMap, sync::Arc};

use alloy_primitives::{Address, B256, U256};
use market_primitives::merkle::MerkleTree;
use tracing::{error, info};
use uuid::Uuid;

use crate::store::{ClaimRow, DistributionRow, DistributionStatus, Store, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("rewards already claimed")]
    AlreadyClaimed,
    #[error("distribution has expired")]
    Expired,
    #[error("distribution is {0:?}, not a draft")]
    NotDraft(DistributionStatus),
    #[error("distribution has no leaves")]
    EmptyLeafSet,
    #[error("leaf for {0} has a zero amount")]
    ZeroAmount(Address),
    #[error("invalid period: start {start}, end {end}, expiry {expires_at}")]
    InvalidPeriod { start: u64, end: u64, expires_at: u64 },
    #[error("stored root {stored} does not match the leaves (recomputed {recomputed})")]
    RootMismatch { stored: B256, recomputed: B256 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimProof {
    pub distribution_id: Uuid,
    pub root: B256,
    pub amount: U256,
    pub proof: Vec<B256>,
    pub leaf_index: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimableReward {
    pub distribution_id: Uuid,
    pub root: B256,
    pub amount: U256,
    pub period_start: u64,
    pub period_end: u64,
    pub expires_at: u64,
}

#[derive(Clone)]
pub struct Rewards {
    store: Arc<Store>,
}

impl Rewards {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn create_draft(
        &self,
        leaves: BTreeMap<Address, U256>,
        period_start: u64,
        period_end: u64,
        expires_at: u64,
    ) -> Result<Uuid, DistributionError> {
        if leaves.is_empty() {
            return Err(DistributionError::EmptyLeafSet);
        }
        if let Some((addr, _)) = leaves.iter().find(|(_, amount)| amount.is_zero()) {
            return Err(DistributionError::ZeroAmount(*addr));
        }
        if period_start > period_end || expires_at <= period_end {
            return Err(DistributionError::InvalidPeriod {
                start: period_start,
                end: period_end,
                expires_at,
            });
        }
        let row = DistributionRow {
            id: Uuid::new_v4(),
            root: None,
            period_start,
            period_end,
            expires_at,
            status: DistributionStatus::Draft,
        };
        self.store.insert_distribution(&row, &leaves)?;
        info!(distribution_id = %row.id, leaves = leaves.len(), "distribution drafted");
        Ok(row.id)
    }

    /// DRAFT → PUBLISHED. Publishing again returns the stored root untouched.
    pub fn publish(&self, id: Uuid) -> Result<B256, DistributionError> {
        let row = self.store.distribution(id)?.ok_or(DistributionError::NotFound("distribution"))?;
        match (row.status, row.root) {
            (DistributionStatus::Published, Some(root)) => return Ok(root),
            (DistributionStatus::Draft, _) => {}
            (status, _) => return Err(DistributionError::NotDraft(status)),
        }

        let tree = self.tree(id)?;
        let root = tree.root();
        if self.store.publish_distribution(id, root)? {
            info!(distribution_id = %id, %root, leaves = tree.len(), "distribution published");
            return Ok(root);
        }
        // lost a race with another publisher
        match self.store.distribution(id)? {
            Some(DistributionRow {
                status: DistributionStatus::Published,
                root: Some(stored),
                ..
            }) => Ok(stored),
            Some(other) => Err(DistributionError::NotDraft(other.status)),
            None => Err(DistributionError::NotFound("distribution")),
        }
    }

    /// Proof for `address` in distribution `id`, without recording anything.
    pub fn prove_for(&self, id: Uuid, address: Address) -> Result<ClaimProof, DistributionError> {
        let row = self.store.distribution(id)?.ok_or(DistributionError::NotFound("distribution"))?;
        let stored = match (row.status, row.root) {
            (DistributionStatus::Published, Some(root)) => root,
            _ => return Err(DistributionError::NotFound("distribution")),
        };

        let leaves = self.store.distribution_leaves(id)?;
        if !leaves.contains_key(&address) {
            return Err(DistributionError::NotFound("reward"));
        }
        if self.store.has_claim(id, address)? {
            return Err(DistributionError::AlreadyClaimed);
        }

        let tree = MerkleTree::new(&leaves).ok_or(DistributionError::EmptyLeafSet)?;
        let Some((amount, proof, leaf_index)) = tree.proof_for(address) else {
            return Err(DistributionError::NotFound("reward"));
        };
        if tree.root() != stored {
            error!(distribution_id = %id, %stored, recomputed = %tree.root(), "distribution root mismatch");
            return Err(DistributionError::RootMismatch {
                stored,
                recomputed: tree.root(),
            });
        }
        Ok(ClaimProof {
            distribution_id: id,
            root: stored,
            amount,
            proof,
            leaf_index,
        })
    }

    /// Record the claim of `address` and return its proof. Exactly one concurrent caller wins.
    pub fn claim(&self, id: Uuid, address: Address, now: u64) -> Result<ClaimProof, DistributionError> {
        let proof = self.prove_for(id, address)?;
        let row = self.store.distribution(id)?.ok_or(DistributionError::NotFound("distribution"))?;
        if row.expires_at <= now {
            return Err(DistributionError::Expired);
        }
        let claim = ClaimRow {
            distribution_id: id,
            claimer: address,
            amount: proof.amount,
            proof: proof.proof.clone(),
        };
        match self.store.insert_claim(&claim) {
            Ok(()) => {
                info!(distribution_id = %id, claimer = %address, amount = %proof.amount, "reward claimed");
                Ok(proof)
            }
            Err(StoreError::Duplicate) => Err(DistributionError::AlreadyClaimed),
            Err(e) => Err(e.into()),
        }
    }

    pub fn claimable_for(&self, address: Address, now: u64) -> Result<Vec<ClaimableReward>, DistributionError> {
        Ok(self
            .store
            .claimable_for(address, now)?
            .into_iter()
            .map(|row| ClaimableReward {
                distribution_id: row.distribution_id,
                root: row.root,
                amount: row.amount,
                period_start: row.period_start,
                period_end: row.period_end,
                expires_at: row.expires_at,
            })
            .collect())
    }

    pub fn expire_due(&self, now: u64) -> Result<usize, DistributionError> {
        let expired = self.store.expire_distributions(now)?;
        if expired > 0 {
            info!(expired, "distributions expired");
        }
        Ok(expired)
    }

    fn tree(&self, id: Uuid) -> Result<MerkleTree, DistributionError> {
        let leaves = self.store.distribution_leaves(id)?;
        MerkleTree::new(&leaves).ok_or(DistributionError::EmptyLeafSet)
    }
}
