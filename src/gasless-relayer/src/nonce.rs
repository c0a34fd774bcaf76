//! Per-signer nonce serialization and replay checks.
//!
//! The entrypoint's `nonces(signer)` view is the source of truth. The `nonce_records` table only
//! caches values read from it; since nonces never decrease, a proposal below the cached value can
//! be rejected without a chain round trip. A stale or missing cache only costs that round trip.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::{
    chain::{ChainClient, ChainError},
    contracts,
    store::{Store, StoreError},
};

#[derive(Debug, thiserror::Error)]
pub enum NonceError {
    #[error("nonce {nonce} of {signer} was already used")]
    AlreadyUsed { signer: Address, nonce: U256 },
    #[error("nonce {provided} of {signer} is ahead of the expected {expected}")]
    Ahead {
        signer: Address,
        expected: U256,
        provided: U256,
    },
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

type LockMap = DashMap<Address, Arc<Mutex<()>>>;

#[derive(Clone)]
pub struct NonceGuard {
    chain: Arc<dyn ChainClient>,
    store: Arc<Store>,
    entrypoint: Address,
    locks: Arc<LockMap>,
}

impl NonceGuard {
    pub fn new(chain: Arc<dyn ChainClient>, store: Arc<Store>, entrypoint: Address) -> Self {
        Self {
            chain,
            store,
            entrypoint,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Serialize on `signer` and check that `proposed` is exactly its next on-chain nonce.
    ///
    /// The returned reservation keeps other submissions for the same signer waiting until it is
    /// dropped, which the relayer does once the relay outcome is final.
    pub async fn reserve(&self, signer: Address, proposed: U256) -> Result<NonceReservation, NonceError> {
        let lock = self.locks.entry(signer).or_default().value().clone();
        let guard = lock.lock_owned().await;
        let reservation = NonceReservation {
            signer,
            nonce: proposed,
            guard: Some(guard),
            locks: self.locks.clone(),
        };

        if let Some(cached) = self.store.cached_nonce(signer)? {
            if proposed < cached {
                debug!(%signer, %proposed, %cached, "nonce rejected from cache");
                return Err(NonceError::AlreadyUsed {
                    signer,
                    nonce: proposed,
                });
            }
        }

        let onchain = self.onchain_nonce(signer).await?;
        if proposed < onchain {
            return Err(NonceError::AlreadyUsed {
                signer,
                nonce: proposed,
            });
        }
        if proposed > onchain {
            return Err(NonceError::Ahead {
                signer,
                expected: onchain,
                provided: proposed,
            });
        }
        Ok(reservation)
    }

    /// Read the signer's nonce from the entrypoint and refresh the cache with it.
    pub async fn onchain_nonce(&self, signer: Address) -> Result<U256, NonceError> {
        let onchain = contracts::intent_nonce(self.chain.as_ref(), self.entrypoint, signer).await?;
        self.store.raise_cached_nonce(signer, onchain)?;
        Ok(onchain)
    }

    /// Number of signers with a live lock entry.
    pub fn active_signers(&self) -> usize {
        self.locks.len()
    }
}

/// Record that `nonce` of `signer` was consumed on-chain.
pub fn advance_cache(store: &Store, signer: Address, nonce: U256) -> Result<(), StoreError> {
    store.raise_cached_nonce(signer, nonce.saturating_add(U256::from(1u8)))
}

/// Exclusive hold on a signer's next nonce. Dropping it releases the signer.
pub struct NonceReservation {
    signer: Address,
    nonce: U256,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl NonceReservation {
    pub fn signer(&self) -> Address {
        self.signer
    }

    pub fn nonce(&self) -> U256 {
        self.nonce
    }
}

impl std::fmt::Debug for NonceReservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceReservation")
            .field("signer", &self.signer)
            .field("nonce", &self.nonce)
            .finish()
    }
}

impl Drop for NonceReservation {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map still references an idle lock.
        self.locks.remove_if(&self.signer, |_, lock| Arc::strong_count(lock) == 1);
    }
}
