//! Intent intake: validate, verify, guard the nonce, persist and hand off to the relayer.
//!
//! Everything that can reject an intent happens here, before a row exists, except the checks the
//! worker repeats right before broadcast.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use market_primitives::{ids, CastVote, CreateProposal, ExecuteZap, IndexSet, Intent};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    chain::ChainClient,
    contracts,
    errors::IntentError,
    humanity::{HumanityOracle, WorldIdProof},
    nonce::{NonceError, NonceGuard},
    relayer::{RelayContext, RelayJob, RelaySettings, RelayTicket, RelayerHandle},
    store::{NewRelay, RelayRecord, Store, StoreError},
    unix_now,
    verify::Verifier,
};

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 10_000;

#[derive(Clone)]
pub struct Intake {
    verifier: Verifier,
    guard: NonceGuard,
    relayer: RelayerHandle,
    store: Arc<Store>,
    chain: Arc<dyn ChainClient>,
    humanity: Arc<dyn HumanityOracle>,
    min_relayer_balance: U256,
    collateral_token: Address,
}

impl Intake {
    pub fn new(
        verifier: Verifier,
        relayer: RelayerHandle,
        store: Arc<Store>,
        chain: Arc<dyn ChainClient>,
        humanity: Arc<dyn HumanityOracle>,
        settings: &RelaySettings,
    ) -> Self {
        Self {
            guard: NonceGuard::new(chain.clone(), store.clone(), settings.entrypoint),
            verifier,
            relayer,
            store,
            chain,
            humanity,
            min_relayer_balance: settings.min_relayer_balance,
            collateral_token: settings.collateral_token,
        }
    }

    pub async fn submit_proposal(
        &self,
        intent: CreateProposal,
        signature: &[u8],
        chain_id: Option<u64>,
    ) -> Result<RelayTicket, IntentError> {
        if intent.title.trim().is_empty() {
            return Err(IntentError::Validation("title must not be empty".into()));
        }
        if intent.title.len() > MAX_TITLE_LEN || intent.description.len() > MAX_DESCRIPTION_LEN {
            return Err(IntentError::Validation("title or description too long".into()));
        }
        let intent_ref = self.verifier.verify(&intent, signature, chain_id, unix_now())?;

        let calldata = contracts::create_proposal_calldata(&intent, signature);
        let context = RelayContext::CreateProposal {
            title: intent.title.clone(),
            description: intent.description.clone(),
        };
        self.enqueue(&intent, intent_ref, calldata, context).await
    }

    /// Votes need both the signature and a humanity proof bound to the voter address.
    pub async fn submit_vote(
        &self,
        intent: CastVote,
        signature: &[u8],
        proof: &WorldIdProof,
        chain_id: Option<u64>,
    ) -> Result<RelayTicket, IntentError> {
        let intent_ref = self.verifier.verify(&intent, signature, chain_id, unix_now())?;
        let nullifier_hash = self.humanity.verify(proof, intent.voter).await?;

        let calldata = contracts::cast_vote_calldata(&intent, nullifier_hash, signature);
        let context = RelayContext::CastVote {
            proposal_id: intent.proposal_id,
            support: intent.support,
            nullifier_hash,
        };
        self.enqueue(&intent, intent_ref, calldata, context).await
    }

    pub async fn submit_zap(
        &self,
        intent: ExecuteZap,
        signature: &[u8],
        chain_id: Option<u64>,
    ) -> Result<RelayTicket, IntentError> {
        if intent.wld_amount.is_zero() {
            return Err(IntentError::Validation("wldAmount must be positive".into()));
        }
        let outcome = IndexSet::for_outcome(intent.outcome_index)
            .and_then(|o| ids::validate_index_set(o.as_u256(), U256::from(ids::BINARY_OUTCOME_SLOTS)).map(|()| o))
            .map_err(|e| IntentError::Validation(e.to_string()))?;
        let intent_ref = self.verifier.verify(&intent, signature, chain_id, unix_now())?;

        let expected = ids::binary_position_id(self.collateral_token, intent.condition_id, outcome);
        let calldata = contracts::zap_calldata(&intent, signature);
        let context = RelayContext::ExecuteZap {
            condition_id: intent.condition_id,
            outcome_index: intent.outcome_index,
            expected_position_id: Some(expected),
        };
        self.enqueue(&intent, intent_ref, calldata, context).await
    }

    /// Authoritative next nonce for `address`.
    pub async fn nonce(&self, address: Address) -> Result<U256, IntentError> {
        Ok(self.guard.onchain_nonce(address).await?)
    }

    pub fn relay(&self, id: Uuid) -> Result<Option<RelayRecord>, IntentError> {
        Ok(self.store.relay(id)?)
    }

    async fn enqueue<I: Intent>(
        &self,
        intent: &I,
        intent_ref: B256,
        calldata: Bytes,
        context: RelayContext,
    ) -> Result<RelayTicket, IntentError> {
        let signer = intent.signer();
        let nonce = intent.nonce();

        self.reject_if_live(intent_ref, signer, nonce)?;
        self.ensure_funded().await?;

        let reservation = match self.guard.reserve(signer, nonce).await {
            Ok(reservation) => reservation,
            Err(NonceError::AlreadyUsed { .. }) => {
                // prefer pointing the caller at the relay that used the nonce
                self.reject_if_live(intent_ref, signer, nonce)?;
                return Err(IntentError::NonceAlreadyUsed {
                    signer,
                    nonce,
                    relay_id: None,
                });
            }
            Err(err) => return Err(err.into()),
        };
        self.reject_if_live(intent_ref, signer, nonce)?;

        let slot = self.relayer.try_reserve()?;
        let id = Uuid::new_v4();
        let row = NewRelay {
            id,
            intent_ref,
            kind: I::KIND,
            signer,
            intent_nonce: nonce,
            chain_id: self.verifier.domain().chain_id,
            calldata: calldata.clone(),
            context: serde_json::to_value(&context).map_err(|e| IntentError::Internal(e.to_string()))?,
        };
        match self.store.insert_relay(&row) {
            Ok(()) => {}
            Err(StoreError::Duplicate) => {
                self.reject_if_live(intent_ref, signer, nonce)?;
                return Err(IntentError::NonceAlreadyUsed {
                    signer,
                    nonce,
                    relay_id: None,
                });
            }
            Err(err) => return Err(err.into()),
        }

        let (notify, ticket) = RelayTicket::channel(id);
        slot.send(RelayJob {
            id,
            calldata,
            reservation,
            notify,
        });
        info!(relay_id = %id, kind = %I::KIND, %signer, %nonce, "intent accepted");
        Ok(ticket)
    }

    fn reject_if_live(&self, intent_ref: B256, signer: Address, nonce: U256) -> Result<(), IntentError> {
        match self.store.live_relay_for_intent(intent_ref)? {
            Some(existing) => {
                debug!(relay_id = %existing.id, %intent_ref, "intent already relayed");
                Err(IntentError::NonceAlreadyUsed {
                    signer,
                    nonce,
                    relay_id: Some(existing.id),
                })
            }
            None => Ok(()),
        }
    }

    async fn ensure_funded(&self) -> Result<(), IntentError> {
        let balance = self.chain.balance(self.chain.relayer_address()).await?;
        if balance < self.min_relayer_balance {
            return Err(IntentError::RelayerUnderfunded(format!(
                "relayer balance {balance} is below the minimum {}",
                self.min_relayer_balance
            )));
        }
        Ok(())
    }
}
